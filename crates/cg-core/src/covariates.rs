//! Derived analysis covariates.
//!
//! Every covariate is a member of [`Covariate`] with a declarative
//! [`CovariateSpec`]. Derivation walks [`Covariate::ALL`] in order, so a
//! covariate may only depend on raw fields or on covariates listed before it.
//! Missing inputs and undefined results (log of zero, division by zero) are
//! `None`; nothing here produces `-inf`, NaN, or a placeholder zero.

use std::fmt;

use cg_common::{Error, Result};
use cg_math::{log_or_missing, nearest_distances, ratio_or_missing, Point};
use serde::{Deserialize, Serialize};

use crate::parcel::{Parcel, RawField};

/// Analysis covariates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Covariate {
    TotalIncomeLn,
    EstateIncomeLn,
    SalaryPensionIncomeLn,
    BusinessIncomeLn,
    LutheranLn,
    OrthodoxLn,
    PopulationLn,
    OrthodoxProportion,
    OrthodoxProportionLn,
    IncomePerCapita,
    IncomePerCapitaLn,
    DistanceFromChurch,
    DistanceFromChurchKm,
}

/// How a covariate is computed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transform {
    /// `ln(raw)`.
    Log(RawField),
    /// `numerator / denominator` of two raw fields.
    Ratio(RawField, RawField),
    /// `ln` of an earlier covariate.
    LogOf(Covariate),
    /// Difference of two earlier log covariates.
    LogDifference(Covariate, Covariate),
    /// Distance to the nearest reference point, rounded to whole metres.
    NearestDistance,
    /// An earlier covariate multiplied by a constant.
    Scaled(Covariate, f64),
}

/// Name and transform of one covariate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CovariateSpec {
    pub covariate: Covariate,
    pub transform: Transform,
}

impl Covariate {
    /// All covariates, dependencies first.
    pub const ALL: &'static [Covariate] = &[
        Covariate::TotalIncomeLn,
        Covariate::EstateIncomeLn,
        Covariate::SalaryPensionIncomeLn,
        Covariate::BusinessIncomeLn,
        Covariate::LutheranLn,
        Covariate::OrthodoxLn,
        Covariate::PopulationLn,
        Covariate::OrthodoxProportion,
        Covariate::OrthodoxProportionLn,
        Covariate::IncomePerCapita,
        Covariate::IncomePerCapitaLn,
        Covariate::DistanceFromChurch,
        Covariate::DistanceFromChurchKm,
    ];

    /// Column name.
    pub fn name(&self) -> &'static str {
        match self {
            Covariate::TotalIncomeLn => "total_income_ln",
            Covariate::EstateIncomeLn => "estate_income_ln",
            Covariate::SalaryPensionIncomeLn => "salary_pension_income_ln",
            Covariate::BusinessIncomeLn => "business_income_ln",
            Covariate::LutheranLn => "lutheran_ln",
            Covariate::OrthodoxLn => "orthodox_ln",
            Covariate::PopulationLn => "population_ln",
            Covariate::OrthodoxProportion => "orthodox_proportion",
            Covariate::OrthodoxProportionLn => "orthodox_proportion_ln",
            Covariate::IncomePerCapita => "income_per_capita",
            Covariate::IncomePerCapitaLn => "income_per_capita_ln",
            Covariate::DistanceFromChurch => "distance_from_church",
            Covariate::DistanceFromChurchKm => "distance_from_church_km",
        }
    }

    pub fn parse(s: &str) -> Option<Covariate> {
        let s = s.trim();
        Covariate::ALL.iter().copied().find(|c| c.name() == s)
    }

    fn index(&self) -> usize {
        *self as usize
    }

    pub fn spec(&self) -> CovariateSpec {
        use Covariate as C;
        let transform = match self {
            C::TotalIncomeLn => Transform::Log(RawField::TotalIncome),
            C::EstateIncomeLn => Transform::Log(RawField::EstateIncome),
            C::SalaryPensionIncomeLn => Transform::Log(RawField::SalaryPensionIncome),
            C::BusinessIncomeLn => Transform::Log(RawField::BusinessIncome),
            C::LutheranLn => Transform::Log(RawField::Lutheran),
            C::OrthodoxLn => Transform::Log(RawField::Orthodox),
            C::PopulationLn => Transform::Log(RawField::Population),
            C::OrthodoxProportion => Transform::Ratio(RawField::Orthodox, RawField::Population),
            C::OrthodoxProportionLn => Transform::LogOf(C::OrthodoxProportion),
            C::IncomePerCapita => Transform::Ratio(RawField::TotalIncome, RawField::Population),
            C::IncomePerCapitaLn => Transform::LogDifference(C::TotalIncomeLn, C::PopulationLn),
            C::DistanceFromChurch => Transform::NearestDistance,
            C::DistanceFromChurchKm => Transform::Scaled(C::DistanceFromChurch, 1e-3),
        };
        CovariateSpec {
            covariate: *self,
            transform,
        }
    }

    /// Covariates this one is computed from.
    pub fn dependencies(&self) -> Vec<Covariate> {
        match self.spec().transform {
            Transform::LogOf(c) | Transform::Scaled(c, _) => vec![c],
            Transform::LogDifference(a, b) => vec![a, b],
            Transform::Log(_) | Transform::Ratio(_, _) | Transform::NearestDistance => vec![],
        }
    }
}

impl fmt::Display for Covariate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Covariate {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Covariate::parse(s).ok_or_else(|| format!("unknown covariate: {}", s))
    }
}

/// Check that every covariate's dependencies precede it in
/// [`Covariate::ALL`].
pub fn check_spec_order() -> Result<()> {
    for (pos, cov) in Covariate::ALL.iter().enumerate() {
        for dep in cov.dependencies() {
            let dep_pos = Covariate::ALL.iter().position(|c| *c == dep);
            if dep_pos.is_none_or(|d| d >= pos) {
                return Err(Error::Config(format!(
                    "covariate {} depends on {} which is not derived before it",
                    cov, dep
                )));
            }
        }
    }
    Ok(())
}

/// Column-oriented covariate values, one row per parcel.
#[derive(Debug, Clone, PartialEq)]
pub struct CovariateTable {
    rows: usize,
    columns: Vec<Vec<Option<f64>>>,
}

impl CovariateTable {
    /// A table of `rows` rows with every value missing.
    pub fn empty(rows: usize) -> Self {
        CovariateTable {
            rows,
            columns: vec![vec![None; rows]; Covariate::ALL.len()],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn column(&self, cov: Covariate) -> &[Option<f64>] {
        &self.columns[cov.index()]
    }

    pub fn value(&self, row: usize, cov: Covariate) -> Option<f64> {
        self.columns[cov.index()][row]
    }

    pub fn set(&mut self, row: usize, cov: Covariate, value: Option<f64>) {
        self.columns[cov.index()][row] = value;
    }

    /// Number of present values in a column.
    pub fn present(&self, cov: Covariate) -> usize {
        self.column(cov).iter().filter(|v| v.is_some()).count()
    }
}

/// Derive every covariate for `parcels`.
///
/// `churches` is `None` when no church layer was supplied; the distance
/// covariates are then missing for every row. An empty church list is a
/// configuration error.
pub fn derive_covariates(parcels: &[Parcel], churches: Option<&[Point]>) -> Result<CovariateTable> {
    check_spec_order()?;
    let n = parcels.len();
    let mut table = CovariateTable::empty(n);

    let nearest = match churches {
        Some(refs) => {
            let coords: Vec<Point> = parcels.iter().map(|p| p.coord).collect();
            Some(nearest_distances(&coords, refs)?)
        }
        None => None,
    };

    for cov in Covariate::ALL {
        let column: Vec<Option<f64>> = match cov.spec().transform {
            Transform::Log(field) => parcels
                .iter()
                .map(|p| p.raw(field).and_then(log_or_missing))
                .collect(),
            Transform::Ratio(num, den) => parcels
                .iter()
                .map(|p| match (p.raw(num), p.raw(den)) {
                    (Some(a), Some(b)) => ratio_or_missing(a, b),
                    _ => None,
                })
                .collect(),
            Transform::LogOf(src) => table
                .column(src)
                .iter()
                .map(|v| v.and_then(log_or_missing))
                .collect(),
            Transform::LogDifference(a, b) => table
                .column(a)
                .iter()
                .zip(table.column(b))
                .map(|(x, y)| match (x, y) {
                    (Some(x), Some(y)) => Some(x - y),
                    _ => None,
                })
                .collect(),
            Transform::NearestDistance => match &nearest {
                Some(d) => d.iter().map(|v| Some(*v)).collect(),
                None => vec![None; n],
            },
            Transform::Scaled(src, factor) => table
                .column(src)
                .iter()
                .map(|v| v.map(|x| x * factor))
                .collect(),
        };
        table.columns[cov.index()] = column;
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parcel(pop: f64, orth: f64, income: f64) -> Parcel {
        Parcel::new("p", 0.0, 0.0, "A")
            .with(RawField::Population, pop)
            .with(RawField::Orthodox, orth)
            .with(RawField::TotalIncome, income)
    }

    #[test]
    fn spec_table_is_ordered() {
        check_spec_order().unwrap();
    }

    #[test]
    fn names_roundtrip() {
        for c in Covariate::ALL {
            assert_eq!(Covariate::parse(c.name()), Some(*c));
        }
        assert_eq!("orthodox_proportion_ln".parse::<Covariate>(), Ok(Covariate::OrthodoxProportionLn));
        assert!(Covariate::parse("wealth").is_none());
    }

    #[test]
    fn zero_population_gives_missing_proportion() {
        let t = derive_covariates(&[parcel(0.0, 0.0, 100.0)], None).unwrap();
        assert_eq!(t.value(0, Covariate::OrthodoxProportion), None);
        assert_eq!(t.value(0, Covariate::OrthodoxProportionLn), None);
        assert_eq!(t.value(0, Covariate::PopulationLn), None);
        assert_eq!(t.value(0, Covariate::IncomePerCapita), None);
    }

    #[test]
    fn zero_orthodox_gives_zero_share_and_missing_log() {
        let t = derive_covariates(&[parcel(10.0, 0.0, 100.0)], None).unwrap();
        assert_eq!(t.value(0, Covariate::OrthodoxProportion), Some(0.0));
        assert_eq!(t.value(0, Covariate::OrthodoxProportionLn), None);
        assert_eq!(t.value(0, Covariate::OrthodoxLn), None);
    }

    #[test]
    fn income_per_capita_ln_is_log_difference() {
        let t = derive_covariates(&[parcel(20.0, 5.0, 1000.0)], None).unwrap();
        let ln = t.value(0, Covariate::IncomePerCapitaLn).unwrap();
        assert!((ln - (1000.0f64 / 20.0).ln()).abs() < 1e-12);
        let share = t.value(0, Covariate::OrthodoxProportion).unwrap();
        assert!((share - 0.25).abs() < 1e-12);
    }

    #[test]
    fn missing_income_propagates() {
        let p = Parcel::new("p", 0.0, 0.0, "A").with(RawField::Population, 10.0);
        let t = derive_covariates(&[p], None).unwrap();
        assert_eq!(t.value(0, Covariate::TotalIncomeLn), None);
        assert_eq!(t.value(0, Covariate::IncomePerCapitaLn), None);
        assert!(t.value(0, Covariate::PopulationLn).is_some());
    }

    #[test]
    fn church_distance_and_km() {
        let parcels = vec![
            Parcel::new("a", 0.0, 0.0, "A"),
            Parcel::new("b", 3000.0, 4000.0, "A"),
        ];
        let churches = [Point::new(0.0, 0.0)];
        let t = derive_covariates(&parcels, Some(&churches)).unwrap();
        assert_eq!(t.value(0, Covariate::DistanceFromChurch), Some(0.0));
        assert_eq!(t.value(1, Covariate::DistanceFromChurch), Some(5000.0));
        assert_eq!(t.value(1, Covariate::DistanceFromChurchKm), Some(5.0));
    }

    #[test]
    fn no_church_layer_leaves_distance_missing() {
        let t = derive_covariates(&[Parcel::new("a", 0.0, 0.0, "A")], None).unwrap();
        assert_eq!(t.present(Covariate::DistanceFromChurch), 0);
    }

    #[test]
    fn empty_church_list_is_config_error() {
        let err = derive_covariates(&[Parcel::new("a", 0.0, 0.0, "A")], Some(&[])).unwrap_err();
        assert!(matches!(err, Error::NoReferencePoints));
    }
}
