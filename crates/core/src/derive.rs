//! Derived view of a formulation: per-row percentages and volumes plus totals.
//!
//! Derivation is a pure function of the rows, the basis and a batch volume. It is recomputed on
//! demand and never stored.

use crate::coerce;
use crate::row::{ComponentRow, QuantityBasis, QuantitySpec, RowId};
use serde::Serialize;

/// One row as displayed: its own quantity plus the values derived from it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DisplayRow {
    pub id: RowId,
    /// 1-based position in the formulation.
    pub position: usize,
    pub name: String,
    pub spec: QuantitySpec,
    pub derived_percentage: f64,
    pub derived_volume_ml: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Totals {
    pub basis: QuantityBasis,
    /// Sum of the rows' own quantities (parts or percentages).
    pub quantity_total: f64,
    pub derived_percentage_total: f64,
    pub volume_total_ml: f64,
    pub row_count: usize,
}

impl Totals {
    /// Sum of parts, only meaningful for ratio formulations.
    pub fn total_ratio_parts(&self) -> Option<f64> {
        (self.basis == QuantityBasis::Ratio).then_some(self.quantity_total)
    }

    /// Sum of entered percentages, only meaningful for percentage formulations.
    pub fn total_percentage(&self) -> Option<f64> {
        (self.basis == QuantityBasis::Percentage).then_some(self.quantity_total)
    }

    /// How far a percentage formulation is from summing to 100.
    ///
    /// Positive when under-filled, negative when over-filled, `None` for ratio formulations.
    /// Deviation is reported, never corrected.
    pub fn percentage_gap(&self) -> Option<f64> {
        self.total_percentage().map(|total| 100.0 - total)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Derivation {
    pub batch_volume_ml: f64,
    pub rows: Vec<DisplayRow>,
    pub totals: Totals,
}

/// Derives display rows and totals.
///
/// Ratio: `pct = parts / Σparts * 100` (all zero when `Σparts` is zero).
/// Percentage: `pct = value`.
/// Both: `volume = pct / 100 * batch_volume_ml`.
///
/// Ratio shares are computed against the largest part, so huge but finite parts still sum to
/// 100 even when `Σparts` itself overflows.
pub fn derive(rows: &[ComponentRow], basis: QuantityBasis, batch_volume_ml: f64) -> Derivation {
    let batch_volume_ml = coerce::non_negative(batch_volume_ml);
    let quantity_total: f64 = rows.iter().map(|r| r.quantity).sum();
    let largest = rows.iter().map(|r| r.quantity).fold(0.0_f64, f64::max);
    let scaled_total: f64 = if largest > 0.0 {
        rows.iter().map(|r| r.quantity / largest).sum()
    } else {
        0.0
    };

    let display: Vec<DisplayRow> = rows
        .iter()
        .enumerate()
        .map(|(index, row)| {
            let pct = match basis {
                QuantityBasis::Ratio if scaled_total > 0.0 => {
                    row.quantity / largest / scaled_total * 100.0
                }
                QuantityBasis::Ratio => 0.0,
                QuantityBasis::Percentage => row.quantity,
            };
            DisplayRow {
                id: row.id.clone(),
                position: index + 1,
                name: row.name.clone(),
                spec: row.spec(basis),
                derived_percentage: pct,
                derived_volume_ml: pct / 100.0 * batch_volume_ml,
            }
        })
        .collect();

    let totals = Totals {
        basis,
        quantity_total,
        derived_percentage_total: display.iter().map(|r| r.derived_percentage).sum(),
        volume_total_ml: display.iter().map(|r| r.derived_volume_ml).sum(),
        row_count: display.len(),
    };

    Derivation {
        batch_volume_ml,
        rows: display,
        totals,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn rows(quantities: &[(&str, f64)]) -> Vec<ComponentRow> {
        quantities
            .iter()
            .map(|(name, q)| ComponentRow::new(*name, *q))
            .collect()
    }

    #[test]
    fn test_ratio_derivation() {
        let d = derive(
            &rows(&[("Ethanol", 45.0), ("Calone (10%)", 12.0)]),
            QuantityBasis::Ratio,
            500.0,
        );

        assert!((d.rows[0].derived_percentage - 78.947_368_421).abs() < 1e-6);
        assert!((d.rows[0].derived_volume_ml - 394.736_842_105).abs() < 1e-6);
        assert!((d.rows[1].derived_percentage - 21.052_631_579).abs() < 1e-6);
        assert!((d.rows[1].derived_volume_ml - 105.263_157_895).abs() < 1e-6);
        assert_eq!(d.totals.total_ratio_parts(), Some(57.0));
        assert!((d.totals.derived_percentage_total - 100.0).abs() < EPS);
        assert!((d.totals.volume_total_ml - 500.0).abs() < EPS);
        assert_eq!(d.rows[0].position, 1);
        assert_eq!(d.rows[1].position, 2);
    }

    #[test]
    fn test_huge_parts_still_sum_to_hundred() {
        let d = derive(
            &rows(&[("A", 1e308), ("B", 1e308)]),
            QuantityBasis::Ratio,
            500.0,
        );

        assert!((d.rows[0].derived_percentage - 50.0).abs() < EPS);
        assert!((d.rows[1].derived_percentage - 50.0).abs() < EPS);
        assert!((d.totals.derived_percentage_total - 100.0).abs() < EPS);
        assert!((d.totals.volume_total_ml - 500.0).abs() < EPS);
    }

    #[test]
    fn test_derive_is_idempotent() {
        let input = rows(&[("Ethanol", 45.0), ("Calone (10%)", 12.0), ("Iso E", 7.5)]);

        let first = derive(&input, QuantityBasis::Ratio, 500.0);
        let second = derive(&input, QuantityBasis::Ratio, 500.0);

        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_percentage_rows_are_not_normalised() {
        let d = derive(
            &rows(&[("Ethanol", 45.0), ("Calone (10%)", 12.0)]),
            QuantityBasis::Percentage,
            500.0,
        );

        assert_eq!(d.rows[0].derived_percentage, 45.0);
        assert_eq!(d.rows[1].derived_percentage, 12.0);
        assert!((d.rows[0].derived_volume_ml - 225.0).abs() < EPS);
        assert!((d.rows[1].derived_volume_ml - 60.0).abs() < EPS);
        assert_eq!(d.totals.total_percentage(), Some(57.0));
        assert_eq!(d.totals.percentage_gap(), Some(43.0));
        assert!((d.totals.volume_total_ml - 285.0).abs() < EPS);
    }

    #[test]
    fn test_percentage_derivation_reports_gap() {
        let d = derive(
            &rows(&[("A", 30.0), ("B", 50.0)]),
            QuantityBasis::Percentage,
            200.0,
        );

        assert_eq!(d.rows[0].derived_volume_ml, 60.0);
        assert_eq!(d.rows[1].derived_volume_ml, 100.0);
        assert_eq!(d.totals.total_percentage(), Some(80.0));
        assert_eq!(d.totals.total_ratio_parts(), None);
        assert_eq!(d.totals.percentage_gap(), Some(20.0));
    }

    #[test]
    fn test_zero_parts_derive_to_zero() {
        let d = derive(&rows(&[("A", 0.0), ("B", 0.0)]), QuantityBasis::Ratio, 500.0);

        for row in &d.rows {
            assert_eq!(row.derived_percentage, 0.0);
            assert_eq!(row.derived_volume_ml, 0.0);
            assert!(row.derived_percentage.is_finite());
        }
        assert_eq!(d.totals.derived_percentage_total, 0.0);
    }

    #[test]
    fn test_zero_batch_volume() {
        let d = derive(&rows(&[("A", 3.0)]), QuantityBasis::Ratio, 0.0);
        assert_eq!(d.rows[0].derived_percentage, 100.0);
        assert_eq!(d.rows[0].derived_volume_ml, 0.0);
    }

    #[test]
    fn test_empty_rows() {
        let d = derive(&[], QuantityBasis::Ratio, 500.0);
        assert!(d.rows.is_empty());
        assert_eq!(d.totals.row_count, 0);
        assert_eq!(d.totals.volume_total_ml, 0.0);
    }

    #[test]
    fn test_invalid_batch_volume_is_treated_as_zero() {
        let d = derive(&rows(&[("A", 1.0)]), QuantityBasis::Ratio, f64::NAN);
        assert_eq!(d.batch_volume_ml, 0.0);
        assert_eq!(d.rows[0].derived_volume_ml, 0.0);
    }
}
