//! Validation Traits
//!
//! Common validation patterns shared by the route handlers, plus the
//! checkout request rules applied before either write strategy runs.

use serde::{Deserialize, Serialize};
use testbed_core::{OrderLine, ProductId, UserId};

use crate::error::{ApiError, ApiResult};

/// Most lines a single checkout may carry.
pub const MAX_CHECKOUT_ITEMS: usize = 50;

/// Largest quantity allowed on one line.
pub const MAX_LINE_QUANTITY: i32 = 100;

fn out_of_range(field_name: &str, min: i64, max: i64) -> ApiError {
    ApiError::validation_failed(format!(
        "{} must be between {} and {}",
        field_name, min, max
    ))
    .with_details(serde_json::json!({ "field": field_name, "min": min, "max": max }))
}

/// Trait for validating that an optional field was supplied.
pub trait ValidatePresent<T> {
    /// # Errors
    /// Returns `ApiError::missing_field` when the value is absent.
    fn validate_present(self, field_name: &str) -> ApiResult<T>;
}

impl<T> ValidatePresent<T> for Option<T> {
    fn validate_present(self, field_name: &str) -> ApiResult<T> {
        self.ok_or_else(|| ApiError::missing_field(field_name))
    }
}

/// Trait for validating numeric ranges.
///
/// # Example
/// ```ignore
/// use testbed_api::validation::ValidateRange;
///
/// fn set_quantity(quantity: i32) -> ApiResult<()> {
///     quantity.validate_range("quantity", 1, 100)?;
///     Ok(())
/// }
/// ```
pub trait ValidateRange {
    /// Validate that the value is positive (> 0).
    fn validate_positive(&self, field_name: &str) -> ApiResult<()>;

    /// Validate that the value is within an inclusive range.
    fn validate_range(&self, field_name: &str, min: Self, max: Self) -> ApiResult<()>
    where
        Self: Sized;
}

macro_rules! impl_validate_range {
    ($($t:ty),*) => {
        $(
            impl ValidateRange for $t {
                fn validate_positive(&self, field_name: &str) -> ApiResult<()> {
                    if *self <= 0 as $t {
                        return Err(ApiError::validation_failed(format!(
                            "{} must be positive",
                            field_name
                        ))
                        .with_details(serde_json::json!({ "field": field_name })));
                    }
                    Ok(())
                }

                fn validate_range(&self, field_name: &str, min: Self, max: Self) -> ApiResult<()> {
                    if *self < min || *self > max {
                        return Err(out_of_range(field_name, min as i64, max as i64));
                    }
                    Ok(())
                }
            }
        )*
    };
}

impl_validate_range!(i32, i64, usize);

// ============================================================================
// CHECKOUT REQUEST
// ============================================================================

/// One requested line of a checkout body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutItem {
    pub product_id: Option<ProductId>,
    pub quantity: Option<i32>,
}

/// Body of `POST /checkout`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub user_id: Option<UserId>,
    pub items: Option<Vec<CheckoutItem>>,
}

impl CheckoutRequest {
    pub fn new(user_id: UserId, lines: &[(ProductId, i32)]) -> Self {
        Self {
            user_id: Some(user_id),
            items: Some(
                lines
                    .iter()
                    .map(|&(product_id, quantity)| CheckoutItem {
                        product_id: Some(product_id),
                        quantity: Some(quantity),
                    })
                    .collect(),
            ),
        }
    }

    /// Check every rule and return the user id with the requested lines.
    pub fn validate(&self) -> ApiResult<(UserId, Vec<OrderLine>)> {
        let user_id = self.user_id.validate_present("userId")?;
        user_id.validate_positive("userId")?;

        let items = self.items.as_deref().validate_present("items")?;
        items.len().validate_range("items", 1, MAX_CHECKOUT_ITEMS)?;

        let lines = items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let product_id = item
                    .product_id
                    .validate_present(&format!("items[{}].productId", i))?;
                product_id.validate_positive(&format!("items[{}].productId", i))?;

                let quantity = item
                    .quantity
                    .validate_present(&format!("items[{}].quantity", i))?;
                quantity.validate_range(&format!("items[{}].quantity", i), 1, MAX_LINE_QUANTITY)?;

                Ok(OrderLine {
                    product_id,
                    quantity,
                })
            })
            .collect::<ApiResult<Vec<_>>>()?;

        Ok((user_id, lines))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_validate_positive() {
        assert!(5i64.validate_positive("test").is_ok());
        assert!(0i64.validate_positive("test").is_err());
        assert!((-1i32).validate_positive("test").is_err());
    }

    #[test]
    fn test_validate_range() {
        assert!(1i32.validate_range("test", 1, 10).is_ok());
        assert!(10i32.validate_range("test", 1, 10).is_ok());
        assert!(0i32.validate_range("test", 1, 10).is_err());
        assert!(11usize.validate_range("test", 1, 10).is_err());
    }

    #[test]
    fn test_valid_checkout() {
        let request = CheckoutRequest::new(7, &[(1, 2), (3, 100)]);
        let (user_id, lines) = request.validate().unwrap();
        assert_eq!(user_id, 7);
        assert_eq!(
            lines,
            vec![
                OrderLine { product_id: 1, quantity: 2 },
                OrderLine { product_id: 3, quantity: 100 },
            ]
        );
    }

    #[test]
    fn test_checkout_rejections() {
        let missing_user = CheckoutRequest {
            user_id: None,
            items: Some(vec![]),
        };
        assert_eq!(missing_user.validate().unwrap_err().code, ErrorCode::MissingField);

        let cases = [
            CheckoutRequest::new(0, &[(1, 1)]),
            CheckoutRequest::new(1, &[]),
            CheckoutRequest::new(1, &[(1, 0)]),
            CheckoutRequest::new(1, &[(1, 101)]),
            CheckoutRequest::new(1, &[(-4, 1)]),
            CheckoutRequest::new(1, &vec![(1, 1); MAX_CHECKOUT_ITEMS + 1]),
        ];
        for request in cases {
            let err = request.validate().unwrap_err();
            assert_eq!(err.code, ErrorCode::ValidationFailed, "{:?}", request);
            assert_eq!(err.status_code().as_u16(), 400);
        }

        assert!(CheckoutRequest::new(1, &vec![(1, 1); MAX_CHECKOUT_ITEMS])
            .validate()
            .is_ok());
    }

    #[test]
    fn test_checkout_request_uses_camel_case() {
        let request: CheckoutRequest = serde_json::from_str(
            r#"{"userId": 3, "items": [{"productId": 9, "quantity": 2}]}"#,
        )
        .unwrap();
        assert_eq!(request.user_id, Some(3));
        let (_, lines) = request.validate().unwrap();
        assert_eq!(lines[0].product_id, 9);
    }
}
