use std::collections::HashMap;

use super::device::DeviceRecord;
use super::export::ServiceHandle;

/// A registered device: its record, its export handle and its heartbeat.
#[derive(Debug, Clone)]
pub struct Entry {
    pub record: DeviceRecord,
    pub handle: ServiceHandle,
    /// Last value pushed to `/CustomName`
    pub custom_name: String,
    update_index: u8,
}

impl Entry {
    pub fn update_index(&self) -> u8 {
        self.update_index
    }

    /// Advance the rolling update counter, wrapping 255 -> 0.
    pub fn bump_update_index(&mut self) -> u8 {
        self.update_index = self.update_index.wrapping_add(1);
        self.update_index
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RegistryError {
    #[error("Device already registered: {0}")]
    Duplicate(String),

    #[error("Device not found: {0}")]
    NotFound(String),
}

/// Every device known to the bridge, keyed by `"{model}_{channel}"`.
///
/// Devices are registered once at startup and never removed. Iteration
/// follows registration order.
#[derive(Debug, Default)]
pub struct Registry {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        key: String,
        record: DeviceRecord,
        handle: ServiceHandle,
    ) -> Result<(), RegistryError> {
        if self.index.contains_key(&key) {
            return Err(RegistryError::Duplicate(key));
        }
        if record.is_aggregate() && self.aggregate_key().is_some() {
            return Err(RegistryError::Duplicate(key));
        }

        self.index.insert(key, self.entries.len());
        self.entries.push(Entry {
            custom_name: record.normalized_name(),
            record,
            handle,
            update_index: 0,
        });
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<&DeviceRecord, RegistryError> {
        self.entry(key).map(|e| &e.record)
    }

    pub fn get_mut(&mut self, key: &str) -> Result<&mut DeviceRecord, RegistryError> {
        self.entry_mut(key).map(|e| &mut e.record)
    }

    pub fn entry(&self, key: &str) -> Result<&Entry, RegistryError> {
        self.index
            .get(key)
            .map(|&i| &self.entries[i])
            .ok_or_else(|| RegistryError::NotFound(key.to_string()))
    }

    pub fn entry_mut(&mut self, key: &str) -> Result<&mut Entry, RegistryError> {
        match self.index.get(key) {
            Some(&i) => Ok(&mut self.entries[i]),
            None => Err(RegistryError::NotFound(key.to_string())),
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }

    pub fn entries_mut(&mut self) -> impl Iterator<Item = &mut Entry> {
        self.entries.iter_mut()
    }

    /// Records matching a predicate, in registration order.
    pub fn records_where<'a, P>(&'a self, predicate: P) -> impl Iterator<Item = &'a DeviceRecord>
    where
        P: Fn(&DeviceRecord) -> bool + 'a,
    {
        self.entries
            .iter()
            .map(|e| &e.record)
            .filter(move |r| predicate(r))
    }

    pub fn find_by_service(&self, service_name: &str) -> Option<&Entry> {
        self.entries
            .iter()
            .find(|e| e.handle.service_name == service_name)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn aggregate_key(&self) -> Option<String> {
        self.entries
            .iter()
            .find(|e| e.record.is_aggregate())
            .map(|e| e.record.key())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
pub(crate) fn test_handle(name: &str, instance: u32) -> ServiceHandle {
    ServiceHandle {
        service_name: format!("com.victronenergy.temperature.{}", name),
        instance,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::device::DeviceType;

    fn radio(name: &str, channel: &str, device_type: DeviceType) -> DeviceRecord {
        DeviceRecord::radio(name, "Nexus-TH", channel, "rtl_433/events", "temperature_C", device_type)
    }

    fn register(registry: &mut Registry, record: DeviceRecord) -> Result<(), RegistryError> {
        let instance = 40 + registry.len() as u32;
        let handle = test_handle(&record.normalized_name(), instance);
        registry.register(record.key(), record, handle)
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = Registry::new();
        register(&mut registry, radio("Fridge", "1", DeviceType::Fridge)).unwrap();

        let record = registry.get("Nexus-TH_1").unwrap();
        assert_eq!(record.name, "Fridge");
        assert_eq!(registry.entry("Nexus-TH_1").unwrap().handle.instance, 40);
        assert_eq!(
            registry.get("Nexus-TH_2"),
            Err(RegistryError::NotFound("Nexus-TH_2".to_string()))
        );
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let mut registry = Registry::new();
        register(&mut registry, radio("Fridge", "1", DeviceType::Fridge)).unwrap();
        let err = register(&mut registry, radio("Freezer", "1", DeviceType::Freezer)).unwrap_err();
        assert_eq!(err, RegistryError::Duplicate("Nexus-TH_1".to_string()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_single_aggregate() {
        let mut registry = Registry::new();
        register(&mut registry, DeviceRecord::aggregate()).unwrap();
        let handle = test_handle("Outdoor2", 41);
        let err = registry
            .register("other_1".to_string(), DeviceRecord::aggregate(), handle)
            .unwrap_err();
        assert_eq!(err, RegistryError::Duplicate("other_1".to_string()));
        assert_eq!(registry.aggregate_key().as_deref(), Some("aggregate_1"));
    }

    #[test]
    fn test_records_where_keeps_order() {
        let mut registry = Registry::new();
        register(&mut registry, radio("Front", "1", DeviceType::Outdoor)).unwrap();
        register(&mut registry, radio("Cabin", "2", DeviceType::Room)).unwrap();
        register(&mut registry, radio("Back", "3", DeviceType::Outdoor)).unwrap();

        let names: Vec<_> = registry
            .records_where(|r| r.device_type() == DeviceType::Outdoor)
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(names, vec!["Front", "Back"]);
    }

    #[test]
    fn test_update_index_wraps() {
        let mut registry = Registry::new();
        register(&mut registry, radio("Fridge", "1", DeviceType::Fridge)).unwrap();
        let entry = registry.entry_mut("Nexus-TH_1").unwrap();

        for expected in 1..=255u8 {
            assert_eq!(entry.bump_update_index(), expected);
        }
        assert_eq!(entry.bump_update_index(), 0);
        assert_eq!(entry.bump_update_index(), 1);
    }

    #[test]
    fn test_find_by_service() {
        let mut registry = Registry::new();
        register(&mut registry, radio("Wine Cellar", "4", DeviceType::Room)).unwrap();
        let entry = registry
            .find_by_service("com.victronenergy.temperature.Wine_Cellar")
            .unwrap();
        assert_eq!(entry.record.key(), "Nexus-TH_4");
        assert!(registry.find_by_service("nope").is_none());
    }
}
