// Hidscan Device Registry
// Known-scanner set with connect/disconnect diffing

use indexmap::IndexMap;
use parking_lot::RwLock;
use smallvec::SmallVec;

use crate::input::{Classifier, DeviceDescriptor, DeviceId, DeviceSource};

/// Change in the known-scanner set produced by one registry update
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryDiff {
    /// Scanners that were not known before
    pub connected: Vec<DeviceDescriptor>,
    /// Ids of scanners that are no longer present
    pub disconnected: SmallVec<[DeviceId; 4]>,
}

impl RegistryDiff {
    pub fn is_empty(&self) -> bool {
        self.connected.is_empty() && self.disconnected.is_empty()
    }

    /// Ids of newly connected scanners
    pub fn connected_ids(&self) -> Vec<DeviceId> {
        self.connected.iter().map(|d| d.id).collect()
    }
}

/// Registry of devices currently classified as external scanners.
///
/// Every update computes its diff and swaps the stored set under one write
/// lock, so readers see either the previous or the new set.
#[derive(Debug)]
pub struct DeviceRegistry {
    classifier: Classifier,
    scanners: RwLock<IndexMap<DeviceId, DeviceDescriptor>>,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new(Classifier::default())
    }
}

impl DeviceRegistry {
    pub fn new(classifier: Classifier) -> Self {
        Self {
            classifier,
            scanners: RwLock::new(IndexMap::new()),
        }
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Replace the known set with the scanners among `descriptors`
    pub fn refresh(&self, descriptors: &[DeviceDescriptor]) -> RegistryDiff {
        // Classification is pure, so it runs before taking the lock
        let current: IndexMap<DeviceId, DeviceDescriptor> = descriptors
            .iter()
            .filter(|d| {
                let result = self.classifier.explain(d);
                log::debug!(
                    "device {} '{}' -> {} ({})",
                    d.id,
                    d.name,
                    result.verdict,
                    result.rule
                );
                result.verdict.is_scanner()
            })
            .map(|d| (d.id, d.clone()))
            .collect();

        let mut scanners = self.scanners.write();

        let disconnected: SmallVec<[DeviceId; 4]> = scanners
            .keys()
            .filter(|id| !current.contains_key(*id))
            .copied()
            .collect();
        let connected: Vec<DeviceDescriptor> = current
            .values()
            .filter(|d| !scanners.contains_key(&d.id))
            .cloned()
            .collect();

        *scanners = current;

        RegistryDiff {
            connected,
            disconnected,
        }
    }

    /// Pull descriptors from `source` and refresh.
    ///
    /// Ids whose descriptor can no longer be fetched count as absent.
    pub fn refresh_from<S: DeviceSource + ?Sized>(&self, source: &S) -> RegistryDiff {
        let descriptors: Vec<DeviceDescriptor> = source
            .device_ids()
            .into_iter()
            .filter_map(|id| source.descriptor(id))
            .collect();
        self.refresh(&descriptors)
    }

    /// A device was attached
    pub fn device_added(&self, descriptor: DeviceDescriptor) -> RegistryDiff {
        self.device_changed(descriptor)
    }

    /// A device's metadata changed; re-evaluate it alone
    pub fn device_changed(&self, descriptor: DeviceDescriptor) -> RegistryDiff {
        let is_scanner = self.classifier.is_external_scanner(&descriptor);
        let mut diff = RegistryDiff::default();
        let mut scanners = self.scanners.write();

        match (scanners.contains_key(&descriptor.id), is_scanner) {
            (false, true) => {
                scanners.insert(descriptor.id, descriptor.clone());
                diff.connected.push(descriptor);
            }
            (true, false) => {
                scanners.shift_remove(&descriptor.id);
                diff.disconnected.push(descriptor.id);
            }
            (true, true) => {
                scanners.insert(descriptor.id, descriptor);
            }
            (false, false) => {}
        }

        diff
    }

    /// A device was detached
    pub fn device_removed(&self, id: DeviceId) -> RegistryDiff {
        let mut diff = RegistryDiff::default();
        if self.scanners.write().shift_remove(&id).is_some() {
            diff.disconnected.push(id);
        }
        diff
    }

    /// Current scanners in attach order
    pub fn snapshot(&self) -> Vec<DeviceDescriptor> {
        self.scanners.read().values().cloned().collect()
    }

    pub fn is_scanner(&self, id: DeviceId) -> bool {
        self.scanners.read().contains_key(&id)
    }

    pub fn get(&self, id: DeviceId) -> Option<DeviceDescriptor> {
        self.scanners.read().get(&id).cloned()
    }

    pub fn has_external_scanner(&self) -> bool {
        !self.scanners.read().is_empty()
    }

    pub fn len(&self) -> usize {
        self.scanners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.scanners.read().is_empty()
    }

    /// Drop every known scanner, reporting them as disconnected
    pub fn clear(&self) -> RegistryDiff {
        let mut scanners = self.scanners.write();
        let disconnected = scanners.keys().copied().collect();
        scanners.clear();
        RegistryDiff {
            connected: Vec::new(),
            disconnected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::InputSources;

    fn scanner(id: DeviceId, name: &str) -> DeviceDescriptor {
        DeviceDescriptor::new(id, name)
            .with_keyboard()
            .with_usb_ids(0x05e0, 0x1200)
    }

    #[test]
    fn test_refresh_symmetric_difference() {
        let registry = DeviceRegistry::default();
        let a = scanner(1, "A");
        let b = scanner(2, "B");
        let c = scanner(3, "C");

        let first = registry.refresh(&[a.clone(), b.clone()]);
        assert_eq!(first.connected_ids(), vec![1, 2]);
        assert!(first.disconnected.is_empty());

        let second = registry.refresh(&[b, c]);
        assert_eq!(second.connected_ids(), vec![3]);
        assert_eq!(second.disconnected.as_slice(), &[1]);
        assert_eq!(
            registry.snapshot().iter().map(|d| d.id).collect::<Vec<_>>(),
            vec![2, 3]
        );
    }

    #[test]
    fn test_refresh_ignores_non_scanners() {
        let registry = DeviceRegistry::default();
        let builtin = DeviceDescriptor::new(5, "AT Translated Set 2 keyboard").with_keyboard();
        let power = DeviceDescriptor::new(6, "Power Button").with_sources(InputSources::CLASS_BUTTON);

        let diff = registry.refresh(&[builtin, power]);
        assert!(diff.is_empty());
        assert!(!registry.has_external_scanner());
    }

    #[test]
    fn test_refresh_is_idempotent() {
        let registry = DeviceRegistry::default();
        let devices = vec![scanner(1, "A")];
        registry.refresh(&devices);
        assert!(registry.refresh(&devices).is_empty());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_changed_to_non_scanner_disconnects() {
        let registry = DeviceRegistry::default();
        registry.refresh(&[scanner(1, "A")]);

        let now_virtual = scanner(1, "A").with_virtual(true);
        let diff = registry.device_changed(now_virtual);
        assert_eq!(diff.disconnected.as_slice(), &[1]);
        assert!(!registry.is_scanner(1));
    }

    #[test]
    fn test_changed_scanner_updates_descriptor() {
        let registry = DeviceRegistry::default();
        registry.refresh(&[scanner(1, "A")]);

        let diff = registry.device_changed(scanner(1, "A v2"));
        assert!(diff.is_empty());
        assert_eq!(registry.get(1).map(|d| d.name), Some("A v2".to_string()));
    }

    #[test]
    fn test_added_and_removed() {
        let registry = DeviceRegistry::default();
        let diff = registry.device_added(scanner(4, "Zebra"));
        assert_eq!(diff.connected_ids(), vec![4]);

        // Adding again is not a new connection
        assert!(registry.device_added(scanner(4, "Zebra")).is_empty());

        let diff = registry.device_removed(4);
        assert_eq!(diff.disconnected.as_slice(), &[4]);
        assert!(registry.device_removed(4).is_empty());
    }

    #[test]
    fn test_removed_unknown_id() {
        let registry = DeviceRegistry::default();
        assert!(registry.device_removed(99).is_empty());
    }

    #[test]
    fn test_clear() {
        let registry = DeviceRegistry::default();
        registry.refresh(&[scanner(1, "A"), scanner(2, "B")]);
        let diff = registry.clear();
        assert_eq!(diff.disconnected.as_slice(), &[1, 2]);
        assert!(registry.is_empty());
    }
}
