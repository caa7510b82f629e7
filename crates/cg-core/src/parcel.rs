//! The census parcel record.

use cg_common::ParcelId;
use cg_math::Point;
use serde::{Deserialize, Serialize};

/// Raw numeric columns of the census table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawField {
    Population,
    Lutheran,
    Orthodox,
    TotalIncome,
    EstateIncome,
    SalaryPensionIncome,
    BusinessIncome,
}

impl RawField {
    pub const ALL: &'static [RawField] = &[
        RawField::Population,
        RawField::Lutheran,
        RawField::Orthodox,
        RawField::TotalIncome,
        RawField::EstateIncome,
        RawField::SalaryPensionIncome,
        RawField::BusinessIncome,
    ];

    /// Canonical column name.
    pub fn column(&self) -> &'static str {
        match self {
            RawField::Population => "population",
            RawField::Lutheran => "lutheran",
            RawField::Orthodox => "orthodox",
            RawField::TotalIncome => "total_income",
            RawField::EstateIncome => "estate_income",
            RawField::SalaryPensionIncome => "salary_pension_income",
            RawField::BusinessIncome => "business_income",
        }
    }
}

/// Raw counts and incomes of one parcel. `None` is a missing cell.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCounts {
    pub population: Option<f64>,
    pub lutheran: Option<f64>,
    pub orthodox: Option<f64>,
    pub total_income: Option<f64>,
    pub estate_income: Option<f64>,
    pub salary_pension_income: Option<f64>,
    pub business_income: Option<f64>,
}

impl RawCounts {
    pub fn get(&self, field: RawField) -> Option<f64> {
        match field {
            RawField::Population => self.population,
            RawField::Lutheran => self.lutheran,
            RawField::Orthodox => self.orthodox,
            RawField::TotalIncome => self.total_income,
            RawField::EstateIncome => self.estate_income,
            RawField::SalaryPensionIncome => self.salary_pension_income,
            RawField::BusinessIncome => self.business_income,
        }
    }

    pub fn set(&mut self, field: RawField, value: Option<f64>) {
        let slot = match field {
            RawField::Population => &mut self.population,
            RawField::Lutheran => &mut self.lutheran,
            RawField::Orthodox => &mut self.orthodox,
            RawField::TotalIncome => &mut self.total_income,
            RawField::EstateIncome => &mut self.estate_income,
            RawField::SalaryPensionIncome => &mut self.salary_pension_income,
            RawField::BusinessIncome => &mut self.business_income,
        };
        *slot = value;
    }
}

/// One land parcel of the 1880 census.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parcel {
    pub id: ParcelId,
    /// Projected coordinates in metres.
    pub coord: Point,
    pub district: String,
    pub counts: RawCounts,
    /// Inside one of the old-district polygons.
    pub is_old: bool,
    /// Dense group index, assigned by the grouper.
    pub group: Option<usize>,
}

impl Parcel {
    pub fn new(id: impl Into<String>, x: f64, y: f64, district: impl Into<String>) -> Self {
        Parcel {
            id: ParcelId(id.into()),
            coord: Point::new(x, y),
            district: district.into(),
            counts: RawCounts::default(),
            is_old: false,
            group: None,
        }
    }

    pub fn with(mut self, field: RawField, value: f64) -> Self {
        self.counts.set(field, Some(value));
        self
    }

    pub fn raw(&self, field: RawField) -> Option<f64> {
        self.counts.get(field)
    }
}
