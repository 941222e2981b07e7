//! GST computation.
//!
//! Intra-state supply splits 18% GST into 9% CGST and 9% SGST; inter-state
//! supply (or an unknown state on either side) charges 18% IGST.

use once_cell::sync::Lazy;
use rust_decimal::{Decimal, RoundingStrategy};
use service_core::error::AppError;

use crate::models::TaxBreakdown;

/// 9%, applied once for CGST and once for SGST.
const HALF_RATE: Decimal = Decimal::from_parts(9, 0, 0, false, 2);
/// 18%.
const FULL_RATE: Decimal = Decimal::from_parts(18, 0, 0, false, 2);

/// Largest amount a `NUMERIC(22, 2)` column accepts, exclusive.
static AMOUNT_CEILING: Lazy<Decimal> = Lazy::new(|| Decimal::from_i128_with_scale(10i128.pow(20), 0));

/// Quantity and rate of one invoice line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineAmount {
    pub quantity: Decimal,
    pub rate: Decimal,
}

impl LineAmount {
    pub fn new(quantity: Decimal, rate: Decimal) -> Self {
        Self { quantity, rate }
    }

    /// `quantity * rate`, unrounded.
    pub fn amount(&self) -> Result<Decimal, AppError> {
        self.quantity
            .checked_mul(self.rate)
            .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Line amount is too large")))
    }

    /// `quantity * rate` rounded to paise, as stored on the item.
    pub fn rounded_amount(&self) -> Result<Decimal, AppError> {
        let amount = round_money(self.amount()?);
        ensure_in_range(amount)?;
        Ok(amount)
    }
}

/// Round to 2 decimal places, midpoint away from zero.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Supplier and recipient are in the same state. Blank or missing states never match.
pub fn is_intra_state(business_state: Option<&str>, client_state: Option<&str>) -> bool {
    match (business_state.map(str::trim), client_state.map(str::trim)) {
        (Some(business), Some(client)) if !business.is_empty() && !client.is_empty() => {
            business.to_lowercase() == client.to_lowercase()
        }
        _ => false,
    }
}

/// Compute subtotal, CGST, SGST, IGST and total for a set of lines.
///
/// Every component is rounded to 2 dp and `total` is the sum of the rounded
/// components.
pub fn calculate_gst(
    items: &[LineAmount],
    business_state: Option<&str>,
    client_state: Option<&str>,
) -> Result<TaxBreakdown, AppError> {
    let mut subtotal = Decimal::ZERO;
    for item in items {
        subtotal = checked_sum(subtotal, item.amount()?)?;
    }
    let subtotal = round_money(subtotal);
    ensure_in_range(subtotal)?;

    let (cgst, sgst, igst) = if is_intra_state(business_state, client_state) {
        let half = round_money(subtotal * HALF_RATE);
        (half, half, Decimal::ZERO)
    } else {
        (Decimal::ZERO, Decimal::ZERO, round_money(subtotal * FULL_RATE))
    };

    let total = checked_sum(checked_sum(checked_sum(subtotal, cgst)?, sgst)?, igst)?;
    ensure_in_range(total)?;

    Ok(TaxBreakdown {
        subtotal,
        cgst,
        sgst,
        igst,
        total,
    })
}

fn checked_sum(left: Decimal, right: Decimal) -> Result<Decimal, AppError> {
    left.checked_add(right)
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Invoice total is too large")))
}

fn ensure_in_range(amount: Decimal) -> Result<(), AppError> {
    if amount.abs() >= *AMOUNT_CEILING {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Amount {} exceeds the supported range",
            amount
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn same_state_splits_into_cgst_and_sgst() {
        let items = [LineAmount::new(dec!(2), dec!(100))];
        let tax = calculate_gst(&items, Some("Maharashtra"), Some("Maharashtra")).unwrap();

        assert_eq!(tax.subtotal, dec!(200.00));
        assert_eq!(tax.cgst, dec!(18.00));
        assert_eq!(tax.sgst, dec!(18.00));
        assert_eq!(tax.igst, dec!(0));
        assert_eq!(tax.total, dec!(236.00));
    }

    #[test]
    fn different_state_charges_igst() {
        let items = [LineAmount::new(dec!(1), dec!(1000))];
        let tax = calculate_gst(&items, Some("Maharashtra"), Some("Karnataka")).unwrap();

        assert_eq!(tax.subtotal, dec!(1000.00));
        assert_eq!(tax.cgst, dec!(0));
        assert_eq!(tax.sgst, dec!(0));
        assert_eq!(tax.igst, dec!(180.00));
        assert_eq!(tax.total, dec!(1180.00));
    }

    #[test]
    fn state_comparison_ignores_case_and_whitespace() {
        assert!(is_intra_state(Some(" maharashtra "), Some("MAHARASHTRA")));
        assert!(!is_intra_state(None, Some("Karnataka")));
        assert!(!is_intra_state(Some(""), Some("")));
        assert!(!is_intra_state(None, None));
    }

    #[test]
    fn missing_business_state_falls_back_to_igst() {
        let items = [LineAmount::new(dec!(1), dec!(50))];
        let tax = calculate_gst(&items, None, Some("Goa")).unwrap();
        assert_eq!(tax.igst, dec!(9.00));
        assert_eq!(tax.cgst + tax.sgst, dec!(0));
    }

    #[test]
    fn components_round_half_up_and_total_is_their_sum() {
        // 0.50 * 0.09 = 0.045, a midpoint.
        let items = [LineAmount::new(dec!(1), dec!(0.50))];
        let tax = calculate_gst(&items, Some("Kerala"), Some("Kerala")).unwrap();
        assert_eq!(tax.cgst, dec!(0.05));
        assert_eq!(tax.sgst, dec!(0.05));
        assert_eq!(tax.total, tax.subtotal + tax.cgst + tax.sgst + tax.igst);
    }

    #[test]
    fn subtotal_sums_every_line() {
        let items = [
            LineAmount::new(dec!(3), dec!(33.33)),
            LineAmount::new(dec!(0.5), dec!(10.01)),
        ];
        let tax = calculate_gst(&items, Some("Delhi"), Some("Punjab")).unwrap();
        // 99.99 + 5.005 = 104.995
        assert_eq!(tax.subtotal, dec!(105.00));
        assert_eq!(tax.igst, dec!(18.90));
        assert_eq!(tax.total, dec!(123.90));
    }

    #[test]
    fn calculation_is_deterministic() {
        let items = [LineAmount::new(dec!(7), dec!(19.99))];
        let first = calculate_gst(&items, Some("Goa"), Some("Goa")).unwrap();
        let second = calculate_gst(&items, Some("Goa"), Some("Goa")).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn totals_beyond_column_range_are_rejected() {
        let items = [LineAmount::new(dec!(100000000000), dec!(1000000000000))];
        let err = calculate_gst(&items, Some("Goa"), Some("Goa")).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn multiplication_overflow_is_rejected() {
        let items = [LineAmount::new(Decimal::MAX, dec!(2))];
        assert!(calculate_gst(&items, None, None).is_err());
    }

    #[test]
    fn sums_near_decimal_max_are_rejected_without_panicking() {
        let huge = Decimal::from_i128_with_scale(35 * 10i128.pow(27), 0);
        let items = [LineAmount::new(dec!(1), huge), LineAmount::new(dec!(1), huge)];
        let err = calculate_gst(&items, Some("Goa"), Some("Kerala")).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        let items = [LineAmount::new(dec!(1), Decimal::MAX), LineAmount::new(dec!(1), Decimal::MAX)];
        let err = calculate_gst(&items, Some("Goa"), Some("Goa")).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn empty_item_list_yields_zero_totals() {
        let tax = calculate_gst(&[], Some("Goa"), Some("Goa")).unwrap();
        assert_eq!(tax.total, Decimal::ZERO);
    }
}
