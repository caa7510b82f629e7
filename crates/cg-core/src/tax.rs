//! Income-tax register records.
//!
//! The register lists income components per tax payer. Derivation adds the
//! total income and a dense rank (`order`), where the highest total is rank 1
//! and equal totals share a rank.

use std::fs;
use std::path::Path;

use cg_common::Result;
use serde::{Deserialize, Serialize};

use crate::dataset::csv_error;

/// One row of the income-tax register.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxRecord {
    pub id: String,
    #[serde(deserialize_with = "optional_number")]
    pub estate_income: Option<f64>,
    #[serde(deserialize_with = "optional_number")]
    pub business_income: Option<f64>,
    #[serde(deserialize_with = "optional_number")]
    pub salary_pension_income: Option<f64>,
    #[serde(default, deserialize_with = "optional_number")]
    pub total_income: Option<f64>,
    #[serde(default)]
    pub order: Option<usize>,
}

fn optional_number<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s.parse::<f64>().map(Some).map_err(serde::de::Error::custom),
    }
}

impl TaxRecord {
    /// Sum of the three components; missing if any component is missing.
    pub fn component_total(&self) -> Option<f64> {
        Some(self.estate_income? + self.business_income? + self.salary_pension_income?)
    }
}

/// Fill `total_income` and `order` on every record.
///
/// Returns the number of records whose total is missing.
pub fn derive_tax(records: &mut [TaxRecord]) -> usize {
    for r in records.iter_mut() {
        r.total_income = r.component_total();
    }

    let mut distinct: Vec<f64> = records.iter().filter_map(|r| r.total_income).collect();
    distinct.sort_by(|a, b| b.total_cmp(a));
    distinct.dedup();

    let mut missing = 0;
    for r in records.iter_mut() {
        r.order = match r.total_income {
            Some(t) => distinct
                .binary_search_by(|probe| t.total_cmp(probe))
                .ok()
                .map(|i| i + 1),
            None => {
                missing += 1;
                None
            }
        };
    }
    missing
}

/// Read the register CSV (`id, estate_income, business_income,
/// salary_pension_income`; derived columns optional).
pub fn read_tax_records(path: &Path) -> Result<Vec<TaxRecord>> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| csv_error(path, e))?;
    reader
        .deserialize()
        .map(|row| row.map_err(|e| csv_error(path, e)))
        .collect()
}

/// Write the register with the derived columns.
pub fn write_tax_records(path: &Path, records: &[TaxRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path).map_err(|e| csv_error(path, e))?;
    for r in records {
        writer.serialize(r).map_err(|e| csv_error(path, e))?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(id: &str, e: Option<f64>, b: Option<f64>, s: Option<f64>) -> TaxRecord {
        TaxRecord {
            id: id.to_string(),
            estate_income: e,
            business_income: b,
            salary_pension_income: s,
            total_income: None,
            order: None,
        }
    }

    #[test]
    fn highest_total_ranks_first_and_ties_share() {
        let mut rs = vec![
            record("a", Some(100.0), Some(0.0), Some(0.0)),
            record("b", Some(300.0), Some(50.0), Some(50.0)),
            record("c", Some(50.0), Some(50.0), Some(0.0)),
            record("d", Some(10.0), Some(0.0), Some(0.0)),
        ];
        assert_eq!(derive_tax(&mut rs), 0);
        let orders: Vec<_> = rs.iter().map(|r| r.order).collect();
        assert_eq!(orders, vec![Some(2), Some(1), Some(2), Some(3)]);
        assert_eq!(rs[1].total_income, Some(400.0));
    }

    #[test]
    fn missing_component_leaves_total_and_rank_missing() {
        let mut rs = vec![
            record("a", Some(100.0), None, Some(0.0)),
            record("b", Some(1.0), Some(1.0), Some(1.0)),
        ];
        assert_eq!(derive_tax(&mut rs), 1);
        assert_eq!(rs[0].total_income, None);
        assert_eq!(rs[0].order, None);
        assert_eq!(rs[1].order, Some(1));
    }

    #[test]
    fn csv_roundtrip_keeps_derived_columns() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("tax.csv");
        fs::write(
            &input,
            "id,estate_income,business_income,salary_pension_income\n\
             t1,100,20,\n\
             t2,50,50,25\n",
        )
        .unwrap();
        let mut rs = read_tax_records(&input).unwrap();
        assert_eq!(rs[0].salary_pension_income, None);
        derive_tax(&mut rs);

        let output = dir.path().join("out").join("tax.csv");
        write_tax_records(&output, &rs).unwrap();
        let back = read_tax_records(&output).unwrap();
        assert_eq!(back, rs);
        assert_eq!(back[1].total_income, Some(125.0));
        assert_eq!(back[1].order, Some(1));
    }
}
