//! pipeflow-tracking: entidad `Run`, codec wire y stores de tracking.
//!
//! El servicio de tracking se trata como un store key-value append-only de
//! runs/métricas/params/tags. Los steps del pipeline interactúan con él sólo
//! a través de `TrackingStore` y `RunHandle`.

pub mod config;
pub mod entities;
pub mod error;
pub mod file_store;
pub mod handle;
pub mod store;
pub mod tags;
pub mod wire;

pub use config::{open_store, TrackingConfig};
pub use entities::{Dataset, DatasetInput, InputTag, Metric, Param, Run, RunData, RunInfo, RunInputs, RunStatus, RunTag};
pub use error::TrackingError;
pub use file_store::FileTrackingStore;
pub use handle::RunHandle;
pub use store::{InMemoryTrackingStore, OrderBy, RunFilter, TrackingStore};
pub use wire::WireError;
