use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::derived::{coerce_f64, coerce_i64};
use crate::errors::{AppError, AppResult};

pub const STUDAPART: &str = "studapart";
pub const LACARTEDESCOLOCS: &str = "lacartedescolocs";

const ID_HEX_LEN: usize = 12;

/// One scraped ad exactly as the spider exported it.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct RawListing(Map<String, Value>);

impl RawListing {
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, Value)>) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(key, value)| (key.to_string(), value))
                .collect(),
        )
    }

    /// Scalar value rendered as trimmed text. Blank strings, nulls and
    /// nested structures are treated as missing.
    pub fn text(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(value) => clean_text(value),
            Value::Number(value) => Some(value.to_string()),
            Value::Bool(value) => Some(value.to_string()),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// Coordinates keep their sign when the spider emitted a JSON number.
    fn coordinate(&self, key: &str) -> Option<f64> {
        match self.0.get(key)? {
            Value::Number(value) => value.as_f64().filter(|v| v.is_finite()),
            _ => self.text(key).as_deref().and_then(coerce_f64),
        }
    }
}

fn clean_text(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.chars().all(|c| c == ',' || c.is_whitespace()) {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Source-agnostic listing. Field order is the merged file's column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub id: String,
    pub source: String,
    pub url: Option<String>,
    pub title: Option<String>,
    pub price_eur: Option<f64>,
    pub address: Option<String>,
    pub size_m2: Option<f64>,
    pub rooms: Option<i64>,
    pub floor: Option<String>,
    pub rental_type: Option<String>,
    pub furnished: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arrondissement: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_per_m2: Option<f64>,
}

impl CanonicalRecord {
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        Some((self.latitude?, self.longitude?))
    }
}

/// Fingerprint of a listing URL: the first 12 hex chars of its MD5 digest.
pub fn listing_id(url: &str) -> String {
    let digest = format!("{:x}", md5::compute(url.trim().as_bytes()));
    digest[..ID_HEX_LEN].to_string()
}

/// Maps one source's raw key/value pairs onto a [`CanonicalRecord`].
pub trait ListingAdapter: Send + Sync {
    fn source_tag(&self) -> &str;

    /// `position` is the listing's index in its batch, used for error reports.
    fn adapt(&self, raw: &RawListing, position: usize) -> AppResult<CanonicalRecord>;
}

/// Raw key names for each canonical field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMap {
    pub url: &'static str,
    pub title: &'static str,
    pub price_eur: &'static str,
    pub address: &'static str,
    pub size_m2: &'static str,
    pub rooms: &'static str,
    pub floor: &'static str,
    pub rental_type: &'static str,
    pub furnished: &'static str,
    pub latitude: &'static str,
    pub longitude: &'static str,
}

/// Keys shared by the spiders' feed exports. `RentalAddrese` is the wire name.
pub const SCRAPER_FIELDS: FieldMap = FieldMap {
    url: "AdUrl",
    title: "AdTitle",
    price_eur: "RentalPrice_EUR",
    address: "RentalAddrese",
    size_m2: "RentalSize_m2",
    rooms: "RentalRooms",
    floor: "RentalFloor",
    rental_type: "RentalType",
    furnished: "Furnished",
    latitude: "Lat",
    longitude: "Lon",
};

#[derive(Debug, Clone)]
pub struct FieldMapAdapter {
    tag: String,
    fields: FieldMap,
}

impl FieldMapAdapter {
    pub fn new(tag: impl Into<String>, fields: FieldMap) -> Self {
        Self {
            tag: tag.into(),
            fields,
        }
    }

    pub fn studapart() -> Self {
        Self::new(STUDAPART, SCRAPER_FIELDS)
    }

    pub fn lacartedescolocs() -> Self {
        Self::new(LACARTEDESCOLOCS, SCRAPER_FIELDS)
    }
}

impl ListingAdapter for FieldMapAdapter {
    fn source_tag(&self) -> &str {
        &self.tag
    }

    fn adapt(&self, raw: &RawListing, position: usize) -> AppResult<CanonicalRecord> {
        let fields = &self.fields;
        let url = raw.text(fields.url).ok_or_else(|| AppError::MissingUrl {
            source_tag: self.tag.clone(),
            position,
        })?;

        Ok(CanonicalRecord {
            id: listing_id(&url),
            source: self.tag.clone(),
            title: raw.text(fields.title),
            price_eur: raw.text(fields.price_eur).as_deref().and_then(coerce_f64),
            address: raw.text(fields.address),
            size_m2: raw.text(fields.size_m2).as_deref().and_then(coerce_f64),
            rooms: raw.text(fields.rooms).as_deref().and_then(coerce_i64),
            floor: raw.text(fields.floor),
            rental_type: raw.text(fields.rental_type),
            furnished: raw.text(fields.furnished),
            latitude: raw.coordinate(fields.latitude),
            longitude: raw.coordinate(fields.longitude),
            url: Some(url),
            arrondissement: None,
            price_per_m2: None,
        })
    }
}

/// Adapters keyed by source tag. Unknown tags fall back to the shared
/// scraper dictionary under the caller's tag.
pub struct SourceRegistry {
    adapters: HashMap<String, Box<dyn ListingAdapter>>,
}

impl SourceRegistry {
    pub fn empty() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(FieldMapAdapter::studapart());
        registry.register(FieldMapAdapter::lacartedescolocs());
        registry
    }

    pub fn register<A: ListingAdapter + 'static>(&mut self, adapter: A) {
        self.adapters
            .insert(adapter.source_tag().to_string(), Box::new(adapter));
    }

    pub fn is_known(&self, source: &str) -> bool {
        self.adapters.contains_key(source)
    }

    /// Normalizes a whole batch. The first listing without a URL rejects it.
    pub fn normalize_batch(
        &self,
        source: &str,
        listings: &[RawListing],
    ) -> AppResult<Vec<CanonicalRecord>> {
        match self.adapters.get(source) {
            Some(adapter) => adapt_all(adapter.as_ref(), listings),
            None => adapt_all(&FieldMapAdapter::new(source, SCRAPER_FIELDS), listings),
        }
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn adapt_all(
    adapter: &dyn ListingAdapter,
    listings: &[RawListing],
) -> AppResult<Vec<CanonicalRecord>> {
    listings
        .iter()
        .enumerate()
        .map(|(position, raw)| adapter.adapt(raw, position))
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn studapart_listing() -> RawListing {
        RawListing::from_pairs([
            ("AdUrl", json!(" https://www.studapart.com/fr/logement-123 ")),
            ("AdTitle", json!("  Studio meublé  ")),
            ("RentalPrice_EUR", json!("650")),
            ("RentalAddrese", json!("12 Rue X, 75011 Paris")),
            ("RentalSize_m2", json!("18")),
            ("RentalRooms", json!("1")),
            ("RentalFloor", json!("3ème étage")),
            ("RentalType", json!("Studio")),
            ("Furnished", json!("Meublé")),
        ])
    }

    #[test]
    fn identity_is_a_truncated_md5_of_the_url() {
        let id = listing_id("https://example.com/a/1");
        assert_eq!(id.len(), 12);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(id, listing_id("https://example.com/a/1"));
        assert_ne!(id, listing_id("https://example.com/a/2"));
        assert_eq!(listing_id(""), "d41d8cd98f00");
    }

    #[test]
    fn maps_scraper_fields_onto_canonical_record() {
        let registry = SourceRegistry::with_defaults();
        let records = registry
            .normalize_batch(STUDAPART, &[studapart_listing()])
            .unwrap();
        let record = &records[0];

        assert_eq!(record.source, STUDAPART);
        assert_eq!(
            record.url.as_deref(),
            Some("https://www.studapart.com/fr/logement-123")
        );
        assert_eq!(record.id, listing_id("https://www.studapart.com/fr/logement-123"));
        assert_eq!(record.title.as_deref(), Some("Studio meublé"));
        assert_eq!(record.price_eur, Some(650.0));
        assert_eq!(record.size_m2, Some(18.0));
        assert_eq!(record.rooms, Some(1));
        assert_eq!(record.floor.as_deref(), Some("3ème étage"));
        assert_eq!(record.latitude, None);
        assert_eq!(record.longitude, None);
        assert_eq!(record.arrondissement, None);
        assert_eq!(record.price_per_m2, None);
    }

    #[test]
    fn normalizing_twice_is_identical() {
        let registry = SourceRegistry::with_defaults();
        let listing = studapart_listing();
        let first = registry.normalize_batch(STUDAPART, &[listing.clone()]).unwrap();
        let second = registry.normalize_batch(STUDAPART, &[listing]).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn numeric_json_values_and_blank_text_are_handled() {
        let listing = RawListing::from_pairs([
            ("AdUrl", json!("https://www.lacartedescolocs.fr/colocations/paris/a/xyz")),
            ("AdTitle", json!("   ")),
            ("RentalPrice_EUR", json!(720)),
            ("RentalAddrese", json!(", ")),
            ("RentalSize_m2", json!(12.5)),
            ("RentalRooms", json!("T3")),
            ("RentalFloor", json!(null)),
            ("Furnished", json!("Oui")),
            ("Lat", json!(48.8566)),
            ("Lon", json!(2.3522)),
        ]);
        let records = SourceRegistry::with_defaults()
            .normalize_batch(LACARTEDESCOLOCS, &[listing])
            .unwrap();
        let record = &records[0];

        assert_eq!(record.title, None);
        assert_eq!(record.address, None);
        assert_eq!(record.floor, None);
        assert_eq!(record.rental_type, None);
        assert_eq!(record.price_eur, Some(720.0));
        assert_eq!(record.size_m2, Some(12.5));
        assert_eq!(record.rooms, Some(3));
        assert_eq!(record.coordinates(), Some((48.8566, 2.3522)));
    }

    #[test]
    fn listing_without_url_rejects_the_batch() {
        let missing = RawListing::from_pairs([("AdTitle", json!("No link"))]);
        let err = SourceRegistry::with_defaults()
            .normalize_batch(STUDAPART, &[studapart_listing(), missing])
            .unwrap_err();
        match err {
            AppError::MissingUrl {
                source_tag,
                position,
            } => {
                assert_eq!(source_tag, STUDAPART);
                assert_eq!(position, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unknown_source_uses_shared_dictionary() {
        let registry = SourceRegistry::with_defaults();
        assert!(!registry.is_known("seloger"));
        let records = registry
            .normalize_batch("seloger", &[studapart_listing()])
            .unwrap();
        assert_eq!(records[0].source, "seloger");
        assert_eq!(records[0].price_eur, Some(650.0));
    }

    #[test]
    fn same_url_gives_same_id_across_sources() {
        let registry = SourceRegistry::with_defaults();
        let a = registry
            .normalize_batch(STUDAPART, &[studapart_listing()])
            .unwrap();
        let b = registry
            .normalize_batch(LACARTEDESCOLOCS, &[studapart_listing()])
            .unwrap();
        assert_eq!(a[0].id, b[0].id);
        assert_ne!(a[0].source, b[0].source);
    }
}
