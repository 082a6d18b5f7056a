//! In-Memory Datastore Gateway
//!
//! Simulates a datacenter with hosts, raw disks, datastore folders and VMFS
//! datastores. Tracks every call per operation and supports scripted faults,
//! injected latency and delayed invisibility after removal, so lifecycle
//! behavior can be exercised without a real endpoint.

use super::GatewayOp;
use crate::domain::folder::{datastore_inventory_path, normalize_folder_path};
use crate::domain::model::{DatastoreSummary, VMFS_FS_TYPE};
use crate::domain::ports::{
    DatastoreGateway, DatastoreProperties, DatastoreRef, DiskPartition, GatewayResult,
    HostDatastoreSystem, HostDisk, HostMount, ScsiDiskType, VmfsCreateSpec, VmfsExtendSpec,
    VmfsExtent, VolumeInfo,
};
use crate::error::{RemoteError, RemoteErrorKind, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

const GIB: u64 = 1024 * 1024 * 1024;

// =============================================================================
// Lab Inventory
// =============================================================================

/// A host and its raw disks
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabHost {
    #[serde(default)]
    pub disks: Vec<HostDisk>,
}

/// A datastore in the simulated inventory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabDatastore {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub folder: String,
    #[serde(default = "default_fs_type")]
    pub fs_type: String,
    /// Extent disk names, VMFS only
    #[serde(default)]
    pub extents: Vec<String>,
    /// Hosts that have the datastore mounted
    #[serde(default)]
    pub host_mounts: Vec<String>,
    #[serde(default)]
    pub capacity_bytes: u64,
}

fn default_fs_type() -> String {
    VMFS_FS_TYPE.to_string()
}

/// Serializable snapshot of the simulated datacenter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabInventory {
    pub datacenter: String,
    #[serde(default)]
    pub folders: BTreeSet<String>,
    #[serde(default)]
    pub hosts: BTreeMap<String, LabHost>,
    #[serde(default)]
    pub datastores: BTreeMap<String, LabDatastore>,
    #[serde(default)]
    pub next_id: u64,
}

impl LabInventory {
    /// Load an inventory from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_yaml::from_str(&raw)?)
    }

    /// Write the inventory to a YAML file
    pub fn save_yaml_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let raw = serde_yaml::to_string(self)?;
        std::fs::write(path.as_ref(), raw)?;
        Ok(())
    }

    fn disk_in_use(&self, canonical_name: &str) -> bool {
        self.datastores
            .values()
            .any(|ds| ds.extents.iter().any(|d| d == canonical_name))
    }

    fn find_disk(&self, host_id: &str, device_path: &str) -> Option<&HostDisk> {
        self.hosts
            .get(host_id)?
            .disks
            .iter()
            .find(|d| d.device_path == device_path)
    }

    fn datastore_ref(&self, ds: &LabDatastore) -> DatastoreRef {
        DatastoreRef {
            id: ds.id.clone(),
            inventory_path: datastore_inventory_path(&self.datacenter, &ds.folder, &ds.name),
        }
    }

    fn name_taken(&self, name: &str, except: Option<&str>) -> bool {
        self.datastores
            .values()
            .any(|ds| ds.name == name && Some(ds.id.as_str()) != except)
    }
}

// =============================================================================
// Fault Injection
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct Fault {
    kind: RemoteErrorKind,
    /// `None` fails forever
    remaining: Option<u32>,
}

#[derive(Debug, Default)]
struct LabState {
    inventory: LabInventory,
    calls: HashMap<GatewayOp, u64>,
    faults: HashMap<GatewayOp, Fault>,
    latency: HashMap<GatewayOp, Duration>,
    /// Removed datastores that stay visible for a number of lookups
    lingering: HashMap<String, (DatastoreRef, u32)>,
    linger_polls: u32,
}

// =============================================================================
// In-Memory Gateway
// =============================================================================

/// Gateway backed by an in-memory inventory
#[derive(Debug, Default)]
pub struct InMemoryGateway {
    state: Mutex<LabState>,
}

impl InMemoryGateway {
    /// Create an empty datacenter
    pub fn new(datacenter: &str) -> Self {
        Self::from_inventory(LabInventory {
            datacenter: datacenter.to_string(),
            ..Default::default()
        })
    }

    /// Create a gateway seeded from an inventory snapshot
    pub fn from_inventory(inventory: LabInventory) -> Self {
        Self {
            state: Mutex::new(LabState {
                inventory,
                ..Default::default()
            }),
        }
    }

    /// Current inventory snapshot
    pub fn snapshot(&self) -> LabInventory {
        self.state.lock().inventory.clone()
    }

    pub fn add_host(&self, host_id: &str) {
        self.state
            .lock()
            .inventory
            .hosts
            .entry(host_id.to_string())
            .or_default();
    }

    /// Attach a raw disk of `capacity_gib` to a host
    pub fn add_disk(&self, host_id: &str, canonical_name: &str, capacity_gib: u64) {
        let disk = HostDisk {
            canonical_name: canonical_name.to_string(),
            device_path: format!("/vmfs/devices/disks/{}", canonical_name),
            disk_type: ScsiDiskType::Native512,
            in_use: false,
            capacity_bytes: capacity_gib * GIB,
        };
        self.state
            .lock()
            .inventory
            .hosts
            .entry(host_id.to_string())
            .or_default()
            .disks
            .push(disk);
    }

    /// Create a datastore folder, relative to the datastore root
    pub fn add_folder(&self, folder: &str) {
        let folder = normalize_folder_path(folder);
        let mut state = self.state.lock();
        // Parents exist implicitly
        let mut path = String::new();
        for part in folder.split('/').filter(|p| !p.is_empty()) {
            if !path.is_empty() {
                path.push('/');
            }
            path.push_str(part);
            state.inventory.folders.insert(path.clone());
        }
    }

    /// Insert a datastore directly, bypassing the create call
    pub fn add_datastore(&self, datastore: LabDatastore) {
        self.state
            .lock()
            .inventory
            .datastores
            .insert(datastore.id.clone(), datastore);
    }

    pub fn datastore(&self, id: &str) -> Option<LabDatastore> {
        self.state.lock().inventory.datastores.get(id).cloned()
    }

    pub fn datastore_count(&self) -> usize {
        self.state.lock().inventory.datastores.len()
    }

    /// Fail the next `times` calls of `op` with `kind`
    pub fn inject_fault(&self, op: GatewayOp, kind: RemoteErrorKind, times: u32) {
        self.state.lock().faults.insert(
            op,
            Fault {
                kind,
                remaining: Some(times),
            },
        );
    }

    /// Fail every call of `op` with `kind`
    pub fn inject_persistent_fault(&self, op: GatewayOp, kind: RemoteErrorKind) {
        self.state.lock().faults.insert(
            op,
            Fault {
                kind,
                remaining: None,
            },
        );
    }

    pub fn clear_faults(&self) {
        self.state.lock().faults.clear();
    }

    /// Delay every call of `op`
    pub fn set_latency(&self, op: GatewayOp, latency: Duration) {
        self.state.lock().latency.insert(op, latency);
    }

    /// Keep removed datastores visible for `polls` lookups by ID
    pub fn linger_after_remove(&self, polls: u32) {
        self.state.lock().linger_polls = polls;
    }

    pub fn call_count(&self, op: GatewayOp) -> u64 {
        self.state.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Total number of calls that change remote state
    pub fn mutation_count(&self) -> u64 {
        let state = self.state.lock();
        state
            .calls
            .iter()
            .filter(|(op, _)| op.is_mutation())
            .map(|(_, n)| *n)
            .sum()
    }

    /// Number of removed datastores still visible to lookups by ID
    pub fn lingering_count(&self) -> usize {
        self.state.lock().lingering.len()
    }

    pub fn reset_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Account for a call, apply latency and any scripted fault
    async fn enter(&self, op: GatewayOp) -> GatewayResult<()> {
        let (latency, fault) = {
            let mut state = self.state.lock();
            *state.calls.entry(op).or_insert(0) += 1;

            let latency = state.latency.get(&op).copied();
            let fault = match state.faults.get_mut(&op) {
                Some(fault) => match fault.remaining {
                    None => Some(fault.kind),
                    Some(0) => None,
                    Some(ref mut n) => {
                        *n -= 1;
                        Some(fault.kind)
                    }
                },
                None => None,
            };
            (latency, fault)
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        match fault {
            Some(kind) => {
                debug!(%op, %kind, "Injected gateway fault");
                Err(RemoteError::new(kind, format!("injected {} fault in {}", kind, op)))
            }
            None => Ok(()),
        }
    }
}

fn missing_datastore(id: &str) -> RemoteError {
    RemoteError::not_found(format!("managed object datastore {:?} not found", id))
}

fn missing_host(id: &str) -> RemoteError {
    RemoteError::not_found(format!("managed object host {:?} not found", id))
}

#[async_trait]
impl DatastoreGateway for InMemoryGateway {
    async fn host_datastore_system(&self, host_id: &str) -> GatewayResult<HostDatastoreSystem> {
        self.enter(GatewayOp::HostDatastoreSystem).await?;
        let state = self.state.lock();
        if !state.inventory.hosts.contains_key(host_id) {
            return Err(missing_host(host_id));
        }
        Ok(HostDatastoreSystem {
            host_id: host_id.to_string(),
            reference: format!("datastoreSystem-{}", host_id),
        })
    }

    async fn available_disks(
        &self,
        dss: &HostDatastoreSystem,
        datastore: Option<&DatastoreRef>,
    ) -> GatewayResult<Vec<HostDisk>> {
        self.enter(GatewayOp::AvailableDisks).await?;
        let state = self.state.lock();
        let inventory = &state.inventory;
        if let Some(ds) = datastore {
            if !inventory.datastores.contains_key(&ds.id) {
                return Err(missing_datastore(&ds.id));
            }
        }
        let host = inventory
            .hosts
            .get(&dss.host_id)
            .ok_or_else(|| missing_host(&dss.host_id))?;

        Ok(host
            .disks
            .iter()
            .map(|d| HostDisk {
                in_use: d.in_use || inventory.disk_in_use(&d.canonical_name),
                ..d.clone()
            })
            .collect())
    }

    async fn create_options(
        &self,
        dss: &HostDatastoreSystem,
        device_path: &str,
    ) -> GatewayResult<Vec<VmfsCreateSpec>> {
        self.enter(GatewayOp::CreateOptions).await?;
        let state = self.state.lock();
        let disk = state
            .inventory
            .find_disk(&dss.host_id, device_path)
            .ok_or_else(|| RemoteError::not_found(format!("device {:?} not found", device_path)))?;

        if disk.in_use || state.inventory.disk_in_use(&disk.canonical_name) {
            return Ok(Vec::new());
        }
        Ok(vec![VmfsCreateSpec {
            device_path: device_path.to_string(),
            volume_name: String::new(),
            extent: DiskPartition {
                disk_name: disk.canonical_name.clone(),
                partition: 1,
            },
            major_version: 6,
        }])
    }

    async fn extend_options(
        &self,
        dss: &HostDatastoreSystem,
        datastore: &DatastoreRef,
        device_path: &str,
    ) -> GatewayResult<Vec<VmfsExtendSpec>> {
        self.enter(GatewayOp::ExtendOptions).await?;
        let state = self.state.lock();
        if !state.inventory.datastores.contains_key(&datastore.id) {
            return Err(missing_datastore(&datastore.id));
        }
        let disk = state
            .inventory
            .find_disk(&dss.host_id, device_path)
            .ok_or_else(|| RemoteError::not_found(format!("device {:?} not found", device_path)))?;

        if disk.in_use || state.inventory.disk_in_use(&disk.canonical_name) {
            return Ok(Vec::new());
        }
        Ok(vec![VmfsExtendSpec {
            device_path: device_path.to_string(),
            extent: DiskPartition {
                disk_name: disk.canonical_name.clone(),
                partition: 1,
            },
        }])
    }

    async fn create_vmfs_datastore(
        &self,
        dss: &HostDatastoreSystem,
        spec: VmfsCreateSpec,
    ) -> GatewayResult<DatastoreRef> {
        self.enter(GatewayOp::CreateDatastore).await?;
        let mut state = self.state.lock();
        let inventory = &mut state.inventory;

        if spec.volume_name.is_empty() {
            return Err(RemoteError::other("volume name must not be empty"));
        }
        if inventory.name_taken(&spec.volume_name, None) {
            return Err(RemoteError::other(format!(
                "a datastore named {:?} already exists",
                spec.volume_name
            )));
        }
        let disk = inventory
            .find_disk(&dss.host_id, &spec.device_path)
            .cloned()
            .ok_or_else(|| {
                RemoteError::not_found(format!("device {:?} not found", spec.device_path))
            })?;
        if disk.in_use || inventory.disk_in_use(&disk.canonical_name) {
            return Err(RemoteError::resource_in_use(format!(
                "disk {:?} is already in use",
                disk.canonical_name
            )));
        }

        inventory.next_id += 1;
        let datastore = LabDatastore {
            id: format!("datastore-{}", inventory.next_id),
            name: spec.volume_name,
            folder: String::new(),
            fs_type: VMFS_FS_TYPE.to_string(),
            extents: vec![disk.canonical_name],
            host_mounts: vec![dss.host_id.clone()],
            capacity_bytes: disk.capacity_bytes,
        };
        let reference = inventory.datastore_ref(&datastore);
        inventory
            .datastores
            .insert(datastore.id.clone(), datastore);

        debug!(id = %reference.id, "Created simulated datastore");
        Ok(reference)
    }

    async fn extend_vmfs_datastore(
        &self,
        dss: &HostDatastoreSystem,
        datastore: &DatastoreRef,
        spec: VmfsExtendSpec,
    ) -> GatewayResult<DatastoreRef> {
        self.enter(GatewayOp::ExtendDatastore).await?;
        let mut state = self.state.lock();
        let inventory = &mut state.inventory;

        let disk = inventory
            .find_disk(&dss.host_id, &spec.device_path)
            .cloned()
            .ok_or_else(|| {
                RemoteError::not_found(format!("device {:?} not found", spec.device_path))
            })?;
        if disk.in_use || inventory.disk_in_use(&disk.canonical_name) {
            return Err(RemoteError::resource_in_use(format!(
                "disk {:?} is already in use",
                disk.canonical_name
            )));
        }

        let ds = inventory
            .datastores
            .get_mut(&datastore.id)
            .ok_or_else(|| missing_datastore(&datastore.id))?;
        ds.extents.push(disk.canonical_name);
        ds.capacity_bytes += disk.capacity_bytes;
        let ds = ds.clone();

        Ok(inventory.datastore_ref(&ds))
    }

    async fn remove_datastore(
        &self,
        _dss: &HostDatastoreSystem,
        datastore: &DatastoreRef,
    ) -> GatewayResult<()> {
        self.enter(GatewayOp::RemoveDatastore).await?;
        let mut state = self.state.lock();
        let removed = state
            .inventory
            .datastores
            .remove(&datastore.id)
            .ok_or_else(|| missing_datastore(&datastore.id))?;

        if state.linger_polls > 0 {
            let reference = state.inventory.datastore_ref(&removed);
            let polls = state.linger_polls;
            state
                .lingering
                .insert(removed.id.clone(), (reference, polls));
        }
        debug!(id = %removed.id, "Removed simulated datastore");
        Ok(())
    }

    async fn datastore_from_id(&self, id: &str) -> GatewayResult<DatastoreRef> {
        self.enter(GatewayOp::DatastoreFromId).await?;
        let mut state = self.state.lock();
        if let Some(ds) = state.inventory.datastores.get(id) {
            return Ok(state.inventory.datastore_ref(ds));
        }
        if let Some((reference, remaining)) = state.lingering.remove(id) {
            if remaining > 1 {
                state
                    .lingering
                    .insert(id.to_string(), (reference.clone(), remaining - 1));
            }
            return Ok(reference);
        }
        Err(missing_datastore(id))
    }

    async fn datastore_properties(
        &self,
        datastore: &DatastoreRef,
    ) -> GatewayResult<DatastoreProperties> {
        self.enter(GatewayOp::DatastoreProperties).await?;
        let state = self.state.lock();
        let ds = state
            .inventory
            .datastores
            .get(&datastore.id)
            .ok_or_else(|| missing_datastore(&datastore.id))?;

        let info = match ds.fs_type.as_str() {
            VMFS_FS_TYPE => VolumeInfo::Vmfs {
                volume_name: ds.name.clone(),
                extents: ds
                    .extents
                    .iter()
                    .map(|d| VmfsExtent {
                        disk_name: d.clone(),
                        partition: 1,
                    })
                    .collect(),
            },
            "NFS" | "NFS41" => VolumeInfo::Nas {
                remote_host: String::new(),
                remote_path: String::new(),
            },
            _ => VolumeInfo::Other,
        };

        Ok(DatastoreProperties {
            summary: DatastoreSummary {
                name: ds.name.clone(),
                fs_type: ds.fs_type.clone(),
                capacity_bytes: ds.capacity_bytes,
                free_space_bytes: ds.capacity_bytes,
                uncommitted_space_bytes: 0,
                accessible: true,
                maintenance_mode: "normal".into(),
                multiple_host_access: ds.host_mounts.len() > 1,
                url: format!("ds:///vmfs/volumes/{}/", ds.id),
            },
            info,
            host_mounts: ds
                .host_mounts
                .iter()
                .map(|h| HostMount {
                    host_id: h.clone(),
                    mounted: true,
                    accessible: true,
                })
                .collect(),
        })
    }

    async fn rename_datastore(&self, datastore: &DatastoreRef, name: &str) -> GatewayResult<()> {
        self.enter(GatewayOp::RenameDatastore).await?;
        let mut state = self.state.lock();
        if state.inventory.name_taken(name, Some(datastore.id.as_str())) {
            return Err(RemoteError::other(format!(
                "a datastore named {:?} already exists",
                name
            )));
        }
        let ds = state
            .inventory
            .datastores
            .get_mut(&datastore.id)
            .ok_or_else(|| missing_datastore(&datastore.id))?;
        ds.name = name.to_string();
        Ok(())
    }

    async fn move_datastore_to_folder(
        &self,
        datastore: &DatastoreRef,
        folder: &str,
    ) -> GatewayResult<()> {
        self.enter(GatewayOp::MoveToFolder).await?;
        let mut state = self.state.lock();
        let folder = normalize_folder_path(folder);
        if !folder.is_empty() && !state.inventory.folders.contains(&folder) {
            return Err(RemoteError::not_found(format!(
                "folder {:?} not found",
                folder
            )));
        }
        let ds = state
            .inventory
            .datastores
            .get_mut(&datastore.id)
            .ok_or_else(|| missing_datastore(&datastore.id))?;
        ds.folder = folder;
        Ok(())
    }
}
