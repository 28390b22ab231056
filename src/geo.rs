//! Arrondissement resolution from free-text addresses, falling back to the
//! nearest reference point for coordinates inside the Paris bounding box.

use std::fmt;
use std::fs;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{AppError, AppResult};

static POSTAL_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"750([0-9]{2})").expect("postal code pattern compiles"));
static PARIS_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"paris\s*([0-9]{1,2})(?:e|ème|er|eme)?\b")
        .expect("paris number pattern compiles")
});
static ARRONDISSEMENT_WORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([0-9]{1,2})(?:e|ème|er|eme)?\s*arrondissement")
        .expect("arrondissement pattern compiles")
});

/// A Paris arrondissement, always in `1..=20`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Arrondissement(u8);

impl Arrondissement {
    pub fn new(number: u32) -> Option<Self> {
        (1..=20).contains(&number).then(|| Self(number as u8))
    }

    pub fn parse_code(code: &str) -> Option<Self> {
        if code.len() != 2 || !code.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        code.parse().ok().and_then(Self::new)
    }

    pub fn number(&self) -> u8 {
        self.0
    }

    /// Zero-padded two-digit code, e.g. `"05"`.
    pub fn code(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Arrondissement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

/// Inclusive latitude/longitude box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub const PARIS: BoundingBox = BoundingBox {
        min_lat: 48.815,
        max_lat: 48.905,
        min_lon: 2.22,
        max_lon: 2.47,
    };

    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        (self.min_lat..=self.max_lat).contains(&lat) && (self.min_lon..=self.max_lon).contains(&lon)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferencePoint {
    pub arrondissement: Arrondissement,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Deserialize)]
struct ReferencePointEntry {
    code: String,
    latitude: f64,
    longitude: f64,
}

const PARIS_CENTERS: [(u8, f64, f64); 20] = [
    (1, 48.8600, 2.3425),
    (2, 48.8680, 2.3410),
    (3, 48.8640, 2.3590),
    (4, 48.8540, 2.3570),
    (5, 48.8460, 2.3500),
    (6, 48.8510, 2.3320),
    (7, 48.8570, 2.3150),
    (8, 48.8760, 2.3100),
    (9, 48.8770, 2.3370),
    (10, 48.8760, 2.3600),
    (11, 48.8590, 2.3800),
    (12, 48.8400, 2.3880),
    (13, 48.8320, 2.3600),
    (14, 48.8300, 2.3270),
    (15, 48.8410, 2.2930),
    (16, 48.8630, 2.2680),
    (17, 48.8880, 2.3050),
    (18, 48.8920, 2.3480),
    (19, 48.8850, 2.3820),
    (20, 48.8640, 2.3980),
];

/// Reference coordinates, one per arrondissement, in lookup order.
/// Built once at start-up and borrowed by every [`GeoResolver`].
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceTable {
    points: Vec<ReferencePoint>,
    bounds: BoundingBox,
}

impl ReferenceTable {
    pub fn paris() -> Self {
        let points = PARIS_CENTERS
            .iter()
            .map(|&(number, latitude, longitude)| ReferencePoint {
                arrondissement: Arrondissement(number),
                latitude,
                longitude,
            })
            .collect();
        Self {
            points,
            bounds: BoundingBox::PARIS,
        }
    }

    pub fn from_json_str(json: &str) -> AppResult<Self> {
        let entries: Vec<ReferencePointEntry> = serde_json::from_str(json)?;
        if entries.is_empty() {
            return Err(AppError::Config("reference table is empty".into()));
        }
        let points = entries
            .into_iter()
            .map(|entry| {
                let arrondissement = Arrondissement::parse_code(&entry.code).ok_or_else(|| {
                    AppError::Config(format!("invalid arrondissement code `{}`", entry.code))
                })?;
                Ok(ReferencePoint {
                    arrondissement,
                    latitude: entry.latitude,
                    longitude: entry.longitude,
                })
            })
            .collect::<AppResult<Vec<_>>>()?;
        Ok(Self {
            points,
            bounds: BoundingBox::PARIS,
        })
    }

    pub fn load(path: &Path) -> AppResult<Self> {
        let json = fs::read_to_string(path).map_err(|err| {
            AppError::Config(format!(
                "reference table {} cannot be read: {err}",
                path.display()
            ))
        })?;
        Self::from_json_str(&json).map_err(|err| {
            AppError::Config(format!(
                "reference table {} is invalid: {err}",
                path.display()
            ))
        })
    }

    pub fn bounds(&self) -> BoundingBox {
        self.bounds
    }

    pub fn points(&self) -> &[ReferencePoint] {
        &self.points
    }

    /// Nearest reference point by planar distance; the earlier entry wins ties.
    fn nearest(&self, lat: f64, lon: f64) -> Option<Arrondissement> {
        let mut best: Option<(f64, Arrondissement)> = None;
        for point in &self.points {
            let distance = (lat - point.latitude).hypot(lon - point.longitude);
            if best.map_or(true, |(current, _)| distance < current) {
                best = Some((distance, point.arrondissement));
            }
        }
        best.map(|(_, arrondissement)| arrondissement)
    }
}

impl Default for ReferenceTable {
    fn default() -> Self {
        Self::paris()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMethod {
    PostalCode,
    ParisNumber,
    ArrondissementWord,
    Coordinates,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub arrondissement: Arrondissement,
    pub method: ResolutionMethod,
}

pub struct GeoResolver<'a> {
    table: &'a ReferenceTable,
}

impl<'a> GeoResolver<'a> {
    pub fn new(table: &'a ReferenceTable) -> Self {
        Self { table }
    }

    /// Text patterns first, in priority order, then the coordinate fallback.
    pub fn resolve(
        &self,
        address: Option<&str>,
        coordinates: Option<(f64, f64)>,
    ) -> Option<Resolution> {
        if let Some(resolution) = address.and_then(resolve_address) {
            return Some(resolution);
        }
        let (lat, lon) = coordinates?;
        let resolved = self.resolve_coordinates(lat, lon);
        if resolved.is_none() {
            debug!(lat, lon, "coordinates left unresolved");
        }
        resolved
    }

    pub fn resolve_coordinates(&self, lat: f64, lon: f64) -> Option<Resolution> {
        if !self.table.bounds().contains(lat, lon) {
            return None;
        }
        self.table.nearest(lat, lon).map(|arrondissement| Resolution {
            arrondissement,
            method: ResolutionMethod::Coordinates,
        })
    }
}

/// Only the first match of each pattern is considered; an out-of-range
/// number falls through to the next pattern.
pub fn resolve_address(address: &str) -> Option<Resolution> {
    if let Some(arrondissement) = first_number(&POSTAL_CODE, address) {
        return Some(Resolution {
            arrondissement,
            method: ResolutionMethod::PostalCode,
        });
    }

    let lowered = address.to_lowercase();
    if let Some(arrondissement) = first_number(&PARIS_NUMBER, &lowered) {
        return Some(Resolution {
            arrondissement,
            method: ResolutionMethod::ParisNumber,
        });
    }
    first_number(&ARRONDISSEMENT_WORD, &lowered).map(|arrondissement| Resolution {
        arrondissement,
        method: ResolutionMethod::ArrondissementWord,
    })
}

fn first_number(pattern: &Regex, text: &str) -> Option<Arrondissement> {
    let captures = pattern.captures(text)?;
    let number = captures.get(1)?.as_str().parse::<u32>().ok()?;
    Arrondissement::new(number)
}
