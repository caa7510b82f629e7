//! Census table input and output.
//!
//! Reads the raw parcel CSV (with either the `*_density` or the canonical
//! count headers), church locations, and the old-district polygons, and writes
//! the processed feature table.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use cg_common::{Error, ParcelId, Result};
use cg_math::Point;
use serde::{Deserialize, Serialize};

use crate::covariates::{Covariate, CovariateTable};
use crate::parcel::{Parcel, RawCounts, RawField};

/// Header renames applied to the raw census table.
const HEADER_RENAMES: &[(&str, &str)] = &[
    ("lutheran_density", "lutheran"),
    ("orthodox_density", "orthodox"),
    ("total_density", "population"),
];

/// Canonical header names. Already-canonical names pass through, so applying
/// this twice gives the same result as applying it once.
pub fn canonicalize_headers<S: AsRef<str>>(headers: &[S]) -> Vec<String> {
    headers
        .iter()
        .map(|h| {
            let h = h.as_ref().trim();
            HEADER_RENAMES
                .iter()
                .find(|(from, _)| *from == h)
                .map(|(_, to)| to.to_string())
                .unwrap_or_else(|| h.to_string())
        })
        .collect()
}

pub(crate) fn csv_error(path: &Path, err: csv::Error) -> Error {
    let line = err
        .position()
        .map(|p| p.line() as usize)
        .unwrap_or_default();
    match err.into_kind() {
        csv::ErrorKind::Io(io) => Error::Io(io),
        other => Error::Parse {
            line,
            message: format!("{}: {:?}", path.display(), other),
        },
    }
}

/// Header positions of a CSV file.
struct Columns {
    index: HashMap<String, usize>,
}

impl Columns {
    fn new(headers: &[String]) -> Self {
        let index = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.clone(), i))
            .collect();
        Columns { index }
    }

    fn require(&self, name: &str) -> Result<usize> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| Error::data_quality(name, "required column is absent"))
    }

    fn optional(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }
}

/// Parse a numeric cell. Empty or `NA`-style cells are missing.
fn parse_number(cell: &str, line: usize, column: &str) -> Result<Option<f64>> {
    let cell = cell.trim();
    if cell.is_empty() || cell.eq_ignore_ascii_case("na") || cell.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    cell.parse::<f64>()
        .map(Some)
        .map_err(|_| Error::Parse {
            line,
            message: format!("column {}: not a number: {:?}", column, cell),
        })
}

fn parse_bool(cell: &str, line: usize, column: &str) -> Result<bool> {
    match cell.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "t" | "yes" => Ok(true),
        "false" | "0" | "f" | "no" | "" => Ok(false),
        other => Err(Error::Parse {
            line,
            message: format!("column {}: not a boolean: {:?}", column, other),
        }),
    }
}

fn required_coordinate(cell: &str, line: usize, column: &str) -> Result<f64> {
    parse_number(cell, line, column)?.ok_or_else(|| Error::DataQuality {
        row: Some(line),
        column: column.to_string(),
        message: "coordinate is missing".to_string(),
    })
}

/// Parcels together with any derived covariate columns found in the file.
#[derive(Debug, Clone)]
pub struct ParcelTable {
    pub parcels: Vec<Parcel>,
    pub covariates: CovariateTable,
}

/// Read a parcel CSV.
///
/// Required columns: `id, x, y, district` and every raw count (under either
/// header spelling). `is_old`, `group`, and derived covariate columns are
/// read when present.
pub fn read_parcels(path: &Path) -> Result<ParcelTable> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| csv_error(path, e))?;
    let raw_headers: Vec<String> = reader
        .headers()
        .map_err(|e| csv_error(path, e))?
        .iter()
        .map(str::to_string)
        .collect();
    let headers = canonicalize_headers(&raw_headers);
    let cols = Columns::new(&headers);

    let id_col = cols.require("id")?;
    let x_col = cols.require("x")?;
    let y_col = cols.require("y")?;
    let district_col = cols.require("district")?;
    let raw_cols = RawField::ALL
        .iter()
        .map(|f| Ok((*f, cols.require(f.column())?)))
        .collect::<Result<Vec<_>>>()?;
    let old_col = cols.optional("is_old");
    let group_col = cols.optional("group");
    let covariate_cols: Vec<(Covariate, usize)> = Covariate::ALL
        .iter()
        .filter_map(|c| cols.optional(c.name()).map(|i| (*c, i)))
        .collect();

    let mut parcels = Vec::new();
    let mut covariate_values: Vec<Vec<(Covariate, Option<f64>)>> = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(|e| csv_error(path, e))?;
        // header is line 1
        let line = row + 2;
        let cell = |i: usize| record.get(i).unwrap_or("");

        let mut counts = RawCounts::default();
        for (field, col) in &raw_cols {
            counts.set(*field, parse_number(cell(*col), line, field.column())?);
        }
        let group = match group_col {
            Some(c) => parse_number(cell(c), line, "group")?
                .map(|g| {
                    if g >= 0.0 && g.fract() == 0.0 {
                        Ok(g as usize)
                    } else {
                        Err(Error::Parse {
                            line,
                            message: format!("column group: not a group index: {}", g),
                        })
                    }
                })
                .transpose()?,
            None => None,
        };

        parcels.push(Parcel {
            id: ParcelId(cell(id_col).trim().to_string()),
            coord: Point::new(
                required_coordinate(cell(x_col), line, "x")?,
                required_coordinate(cell(y_col), line, "y")?,
            ),
            district: cell(district_col).trim().to_string(),
            counts,
            is_old: match old_col {
                Some(c) => parse_bool(cell(c), line, "is_old")?,
                None => false,
            },
            group,
        });

        let mut values = Vec::with_capacity(covariate_cols.len());
        for (cov, col) in &covariate_cols {
            values.push((*cov, parse_number(cell(*col), line, cov.name())?));
        }
        covariate_values.push(values);
    }

    let mut covariates = CovariateTable::empty(parcels.len());
    for (row, values) in covariate_values.into_iter().enumerate() {
        for (cov, value) in values {
            covariates.set(row, cov, value);
        }
    }
    Ok(ParcelTable {
        parcels,
        covariates,
    })
}

/// Read reference points (church locations) from a CSV with `x, y` columns.
pub fn read_points(path: &Path) -> Result<Vec<Point>> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| csv_error(path, e))?;
    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| csv_error(path, e))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    let cols = Columns::new(&headers);
    let x_col = cols.require("x")?;
    let y_col = cols.require("y")?;

    let mut points = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(|e| csv_error(path, e))?;
        let line = row + 2;
        points.push(Point::new(
            required_coordinate(record.get(x_col).unwrap_or(""), line, "x")?,
            required_coordinate(record.get(y_col).unwrap_or(""), line, "y")?,
        ));
    }
    Ok(points)
}

fn format_cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Write the processed parcel table: parcel columns, `is_old`, `group`, and
/// every derived covariate. Missing values are empty cells.
pub fn write_parcels(path: &Path, parcels: &[Parcel], covariates: &CovariateTable) -> Result<()> {
    if covariates.rows() != parcels.len() {
        return Err(Error::dimension(
            "covariate rows",
            parcels.len(),
            covariates.rows(),
        ));
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path).map_err(|e| csv_error(path, e))?;

    let mut header: Vec<&str> = vec!["id", "x", "y", "district"];
    header.extend(RawField::ALL.iter().map(|f| f.column()));
    header.extend(["is_old", "group"]);
    header.extend(Covariate::ALL.iter().map(|c| c.name()));
    writer.write_record(&header).map_err(|e| csv_error(path, e))?;

    for (row, p) in parcels.iter().enumerate() {
        let mut record = vec![
            p.id.0.clone(),
            p.coord.x.to_string(),
            p.coord.y.to_string(),
            p.district.clone(),
        ];
        record.extend(RawField::ALL.iter().map(|f| format_cell(p.raw(*f))));
        record.push(p.is_old.to_string());
        record.push(p.group.map(|g| g.to_string()).unwrap_or_default());
        record.extend(
            Covariate::ALL
                .iter()
                .map(|c| format_cell(covariates.value(row, *c))),
        );
        writer.write_record(&record).map_err(|e| csv_error(path, e))?;
    }
    writer.flush()?;
    Ok(())
}

/// A simple polygon given by its outer ring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<[f64; 2]>", into = "Vec<[f64; 2]>")]
pub struct Polygon {
    pub ring: Vec<Point>,
}

impl From<Vec<[f64; 2]>> for Polygon {
    fn from(coords: Vec<[f64; 2]>) -> Self {
        Polygon {
            ring: coords.into_iter().map(|[x, y]| Point::new(x, y)).collect(),
        }
    }
}

impl From<Polygon> for Vec<[f64; 2]> {
    fn from(p: Polygon) -> Self {
        p.ring.into_iter().map(|pt| [pt.x, pt.y]).collect()
    }
}

impl Polygon {
    /// Whether `p` lies on an edge of the ring.
    fn on_boundary(&self, p: &Point) -> bool {
        let n = self.ring.len();
        (0..n).any(|i| {
            let a = self.ring[i];
            let b = self.ring[(i + 1) % n];
            let cross = (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x);
            let scale = (b.x - a.x).abs().max((b.y - a.y).abs()).max(1.0);
            cross.abs() <= 1e-9 * scale
                && p.x >= a.x.min(b.x)
                && p.x <= a.x.max(b.x)
                && p.y >= a.y.min(b.y)
                && p.y <= a.y.max(b.y)
        })
    }

    /// Strict containment: points on the boundary are outside.
    pub fn contains(&self, p: &Point) -> bool {
        if self.ring.len() < 3 || self.on_boundary(p) {
            return false;
        }
        let n = self.ring.len();
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let (a, b) = (self.ring[i], self.ring[j]);
            if (a.y > p.y) != (b.y > p.y) {
                let x_cross = (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x;
                if p.x < x_cross {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }
}

/// The historical core districts, as a union of polygons.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OldDistricts {
    pub polygons: Vec<Polygon>,
}

impl OldDistricts {
    /// Load from JSON `{"polygons": [[[x, y], ...], ...]}`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let districts: OldDistricts = serde_json::from_str(&content)?;
        if let Some(i) = districts.polygons.iter().position(|p| p.ring.len() < 3) {
            return Err(Error::data_quality(
                "polygons",
                format!("polygon {} has fewer than three vertices", i),
            ));
        }
        Ok(districts)
    }

    /// Whether `p` lies strictly inside any polygon.
    pub fn contains(&self, p: &Point) -> bool {
        self.polygons.iter().any(|poly| poly.contains(p))
    }

    /// Set `is_old` on every parcel; returns how many are inside.
    pub fn mark(&self, parcels: &mut [Parcel]) -> usize {
        let mut inside = 0;
        for parcel in parcels.iter_mut() {
            parcel.is_old = self.contains(&parcel.coord);
            inside += usize::from(parcel.is_old);
        }
        inside
    }
}
