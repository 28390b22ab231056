pub mod config;
pub mod dedup;
pub mod derived;
pub mod errors;
pub mod geo;
pub mod journal;
pub mod listing;
pub mod output;
pub mod pipeline;
pub mod store;

use once_cell::sync::OnceCell;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use config::{InputSpec, PipelineConfig};
pub use dedup::Deduplicator;
pub use errors::{AppError, AppResult};
pub use geo::{GeoResolver, ReferenceTable};
pub use journal::RunJournal;
pub use listing::{CanonicalRecord, RawListing, SourceRegistry};
pub use pipeline::{merge_inputs, LoadSummary, MergeOutcome, Pipeline};
pub use store::{count_records, fetch_record, open_store, write_records, WriteSummary};

pub fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,paris_rentals_lib=debug"));
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    });
}
