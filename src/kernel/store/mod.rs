//! C3: durable store adapter. One module per entity, following the
//! teacher's `Record` trait shape (`kernel/jobs/record.rs`) for the common
//! find/insert/update/delete operations, with entity-specific finders
//! colocated rather than pulled into a generic repository type.

pub mod alerts;
pub mod allowlists;
pub mod events;
pub mod iocs;
pub mod processed_files;
pub mod seen_domains;
pub mod sites;

pub use alerts::{Alert, DeliveryStatus, PgAlertStore};
pub use allowlists::{DomainAllowlist, PgAllowlistStore, StoreBackedAllowlistService};
pub use events::{EventBatchRecord, PgTelemetryStore, TelemetryEvent};
pub use iocs::{Ioc, IocType, PgIocStore};
pub use processed_files::PgProcessedFilesStore;
pub use seen_domains::PgSeenDomainsStore;
pub use sites::{AlertMode, PgSiteStore, Site};
