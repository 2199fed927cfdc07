//! Static reference data: the services the clinic offers.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::value_objects::{Money, ServiceId};

/// Well-known id absent from every catalog. The demo front end and the
/// tests book it to exercise the validation failure path.
pub const UNLISTED_SERVICE_ID: &str = "srv_999";

/// One bookable clinic service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// The service identifier.
    pub service_id: ServiceId,

    /// Human-readable name.
    pub display_name: String,

    /// Price for one booking of this service.
    pub unit_price: Money,
}

impl CatalogEntry {
    /// Creates a new catalog entry.
    pub fn new(
        service_id: impl Into<ServiceId>,
        display_name: impl Into<String>,
        unit_price: Money,
    ) -> Self {
        Self {
            service_id: service_id.into(),
            display_name: display_name.into(),
            unit_price,
        }
    }
}

/// The set of services bookings are validated and priced against.
#[derive(Debug, Clone)]
pub struct ServiceCatalog {
    entries: HashMap<ServiceId, CatalogEntry>,
}

impl ServiceCatalog {
    /// Creates a catalog from the given entries.
    pub fn new(entries: impl IntoIterator<Item = CatalogEntry>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|entry| (entry.service_id.clone(), entry))
                .collect(),
        }
    }

    /// The demo clinic's catalog.
    pub fn clinic_defaults() -> Self {
        Self::new([
            CatalogEntry::new("srv_1", "General Checkup", Money::from_rupees(500)),
            CatalogEntry::new("srv_2", "X-Ray", Money::from_rupees(1200)),
            CatalogEntry::new("srv_3", "Blood Test", Money::from_rupees(300)),
        ])
    }

    /// Looks up an entry by id.
    pub fn entry(&self, id: &ServiceId) -> Option<&CatalogEntry> {
        self.entries.get(id)
    }

    /// Returns true if the id is listed.
    pub fn contains(&self, id: &ServiceId) -> bool {
        self.entries.contains_key(id)
    }

    /// Returns the number of listed services.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the catalog lists nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ServiceCatalog {
    fn default() -> Self {
        Self::clinic_defaults()
    }
}
