//! Purpose: In-process identifier table that allocates slots sequentially.
//! Exports: `SequentialNamespace`.
//! Role: Reference `NamespaceTable` adapter for the CLI, tests, and hosts without a platform table.
//! Invariants: Each successful registration consumes exactly one id, in increasing order.
//! Invariants: A path that resolves to installed content moves that owner to the new id.
//! Invariants: Allocation stops below the direct-mode threshold.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::core::error::{Error, ErrorKind};
use crate::core::identity::{BASE_NAMESPACE_ID, DIRECT_RESOLUTION_THRESHOLD, NamespaceTable};

const BASE_OS_NAME: &str = "android";

#[derive(Debug)]
struct Slot {
    name: String,
    id: u8,
}

#[derive(Debug, Default)]
struct TableState {
    slots: Vec<Slot>,
    owners: HashMap<String, String>,
    next_id: u16,
    registrations: usize,
}

impl TableState {
    fn occupied(&self, id: u8) -> bool {
        self.slots.iter().any(|slot| slot.id == id)
    }

    fn allocate(&mut self) -> Result<u8, Error> {
        let id = u8::try_from(self.next_id)
            .ok()
            .filter(|id| *id < DIRECT_RESOLUTION_THRESHOLD)
            .ok_or_else(|| {
                Error::new(ErrorKind::Busy).with_message("identifier table is exhausted")
            })?;
        self.next_id += 1;
        Ok(id)
    }
}

#[derive(Debug)]
pub struct SequentialNamespace {
    state: Mutex<TableState>,
}

impl Default for SequentialNamespace {
    fn default() -> Self {
        Self::new()
    }
}

impl SequentialNamespace {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TableState {
                next_id: u16::from(BASE_NAMESPACE_ID),
                ..TableState::default()
            }),
        }
    }

    /// A table whose first slot already holds the base OS package.
    pub fn with_base_os() -> Self {
        let table = Self::new();
        {
            let mut state = table.lock();
            state.slots.push(Slot {
                name: BASE_OS_NAME.to_string(),
                id: BASE_NAMESPACE_ID,
            });
            state.next_id = u16::from(BASE_NAMESPACE_ID) + 1;
        }
        table
    }

    /// Installs `name` at the next free id and returns it.
    pub fn install(&self, name: &str, content_path: &str) -> Result<u8, Error> {
        let mut state = self.lock();
        let id = state.allocate()?;
        state.slots.push(Slot {
            name: name.to_string(),
            id,
        });
        state
            .owners
            .insert(content_path.to_string(), name.to_string());
        Ok(id)
    }

    /// Installs `name` at a fixed id, e.g. to simulate earlier shared libraries
    /// or a host that reserves the library's layout (ids at 0x7f and above).
    pub fn install_at(&self, name: &str, content_path: &str, id: u8) -> Result<(), Error> {
        let mut state = self.lock();
        if state.occupied(id) {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("identifier {id} is already occupied")));
        }
        state.slots.push(Slot {
            name: name.to_string(),
            id,
        });
        state
            .owners
            .insert(content_path.to_string(), name.to_string());
        state.next_id = state.next_id.max(u16::from(id) + 1);
        Ok(())
    }

    /// Occupies the next `count` ids with placeholder packages.
    pub fn occupy(&self, prefix: &str, count: u8) -> Result<(), Error> {
        for index in 0..count {
            let name = format!("{prefix}{index}");
            let path = format!("/system/framework/{name}.apk");
            self.install(&name, &path)?;
        }
        Ok(())
    }

    /// Successful `register_entry` calls so far.
    pub fn registrations(&self) -> usize {
        self.lock().registrations
    }

    fn lock(&self) -> MutexGuard<'_, TableState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl NamespaceTable for SequentialNamespace {
    fn assigned_id(&self, name: &str) -> Option<u8> {
        self.lock()
            .slots
            .iter()
            .filter(|slot| slot.name == name)
            .map(|slot| slot.id)
            .max()
    }

    fn register_entry(&self, path: &str) -> Result<(), Error> {
        let mut state = self.lock();
        let owner = state
            .owners
            .get(canonical_content_path(path))
            .cloned()
            .ok_or_else(|| {
                Error::new(ErrorKind::NotFound)
                    .with_message(format!("no installed content at {path}"))
            })?;
        let id = state.allocate()?;
        state.slots.push(Slot { name: owner, id });
        state.registrations += 1;
        Ok(())
    }

    fn assignments(&self) -> Vec<(String, u8)> {
        let state = self.lock();
        let mut latest: HashMap<&str, u8> = HashMap::new();
        for slot in &state.slots {
            let id = latest.entry(slot.name.as_str()).or_insert(slot.id);
            *id = (*id).max(slot.id);
        }
        latest
            .into_iter()
            .map(|(name, id)| (name.to_string(), id))
            .collect()
    }
}

// `/./a` and `/a` name the same file.
fn canonical_content_path(path: &str) -> &str {
    let mut current = path;
    while let Some(rest) = current.strip_prefix("/.") {
        if !rest.starts_with('/') {
            break;
        }
        current = rest;
    }
    current
}

#[cfg(test)]
mod tests {
    use super::{SequentialNamespace, canonical_content_path};
    use crate::core::error::ErrorKind;
    use crate::core::identity::{
        IdentityError, NamespaceTable, PackageSpec, REQUIRED_PACKAGE_ID, ResolutionMode, resolve,
    };

    const LIB: &str = "org.example.lib";
    const APK: &str = "/data/app/lib.apk";

    #[test]
    fn canonical_path_strips_dot_segments_only() {
        assert_eq!(canonical_content_path("/././data/lib.apk"), "/data/lib.apk");
        assert_eq!(canonical_content_path("/data/lib.apk"), "/data/lib.apk");
        assert_eq!(canonical_content_path("/.hidden/lib.apk"), "/.hidden/lib.apk");
    }

    #[test]
    fn registering_content_moves_owner_forward() {
        let table = SequentialNamespace::with_base_os();
        let id = table.install(LIB, APK).expect("install");
        assert_eq!(id, 2);

        table.register_entry("/./data/app/lib.apk").expect("register");
        assert_eq!(table.assigned_id(LIB), Some(3));
        assert_eq!(table.registrations(), 1);
    }

    #[test]
    fn unknown_content_is_not_found() {
        let table = SequentialNamespace::with_base_os();
        let err = table.register_entry("/./missing.apk").expect_err("err");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(table.registrations(), 0);
    }

    #[test]
    fn allocation_stops_before_direct_threshold() {
        let table = SequentialNamespace::new();
        table.install_at(LIB, APK, 0x7e).expect("install");
        let err = table.register_entry("/./data/app/lib.apk").expect_err("full");
        assert_eq!(err.kind(), ErrorKind::Busy);
    }

    #[test]
    fn occupied_slot_rejects_fixed_install() {
        let table = SequentialNamespace::with_base_os();
        let err = table.install_at(LIB, APK, 1).expect_err("occupied");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn assignments_report_latest_id_per_name() {
        let table = SequentialNamespace::with_base_os();
        table.install(LIB, APK).expect("install");
        table.register_entry("/./data/app/lib.apk").expect("register");
        let mut assignments = table.assignments();
        assignments.sort_by_key(|(_, id)| *id);
        assert_eq!(
            assignments,
            vec![("android".to_string(), 1), (LIB.to_string(), 3)]
        );
    }

    #[test]
    fn resolves_against_occupied_table() {
        let table = SequentialNamespace::with_base_os();
        table.occupy("com.vendor.shared", 30).expect("occupy");
        let observed = table.install(LIB, APK).expect("install");
        assert_eq!(observed, 32);

        let identity = resolve(&table, &PackageSpec::new(LIB, APK)).expect("resolve");
        assert_eq!(identity.assigned_id, REQUIRED_PACKAGE_ID);
        assert_eq!(identity.resolution, ResolutionMode::Forced { registrations: 4 });
        assert_eq!(table.registrations(), 4);
    }

    #[test]
    fn crowded_table_is_incompatible() {
        let table = SequentialNamespace::with_base_os();
        table.occupy("com.vendor.shared", 40).expect("occupy");
        table.install(LIB, APK).expect("install");

        let err = resolve(&table, &PackageSpec::new(LIB, APK)).expect_err("collision");
        match err {
            IdentityError::IncompatibleLayout { occupancy, .. } => {
                assert!(occupancy.starts_with("com_vendor_shared0 -> 2,"));
                assert!(occupancy.ends_with("org_example_lib -> 42"));
                assert!(!occupancy.contains("android"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(table.registrations(), 0);
    }
}
