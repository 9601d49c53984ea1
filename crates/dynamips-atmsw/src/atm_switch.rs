//! AtmSwitch - Dynamips virtual ATM switch device

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use dynamips_common::{
    Device, DeviceId, DeviceManager, DynamipsError, DynamipsResult,
    FilterDirection, Hypervisor, NioHandle, CAPTURE_FILTER,
};

use crate::commands::{
    build_capture_filter_args, build_create_switch_cmd, build_create_vcc_cmd,
    build_create_vpc_cmd, build_delete_switch_cmd, build_delete_vcc_cmd, build_delete_vpc_cmd,
    build_rename_switch_cmd,
};
use crate::config::AtmSwitchConfig;
use crate::types::{
    normalize_data_link_type, CircuitKey, PortNumber, Vci, Vpi, DEFAULT_DATA_LINK_TYPE,
};

/// Device type label used in logs and errors
pub const ATM_SWITCH_KIND: &str = "ATM switch";

#[derive(Debug, Clone, Copy)]
enum CircuitAction {
    Create,
    Delete,
}

/// Dynamips virtual ATM switch
///
/// Operation flow:
/// 1. Validate against the local port and circuit tables
/// 2. Send the hypervisor command and await its acknowledgement
/// 3. Update the local tables
///
/// Ports are local bookkeeping only: the hypervisor learns about a NIO when
/// a circuit command references it. The circuit table is not revalidated
/// when a port is removed, so circuits may keep referencing a port that no
/// longer has a NIO.
///
/// Circuit commands and rename need the switch to exist on the hypervisor
/// and fail with `NotCreated` before `create()` succeeded, even when a
/// session is already bound. Capture goes through the NIO and only needs
/// the port.
pub struct AtmSwitch {
    /// Switch name on the hypervisor
    name: String,
    /// Node identifier
    id: DeviceId,
    /// Owning project
    project_id: Uuid,
    /// Manager owning the id pool and hypervisor processes
    manager: Arc<dyn DeviceManager>,
    /// Hypervisor session, bound at construction or on create()
    hypervisor: Option<Arc<Hypervisor>>,
    /// Port number -> NIO
    nios: BTreeMap<PortNumber, NioHandle>,
    /// Source circuit -> destination circuit
    mappings: BTreeMap<CircuitKey, CircuitKey>,
    /// Set once the hypervisor acknowledged the create command
    created: bool,
    /// Set once delete() completed
    deleted: bool,
}

impl fmt::Debug for AtmSwitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtmSwitch")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("port_count", &self.nios.len())
            .field("mapping_count", &self.mappings.len())
            .field("created", &self.created)
            .field("deleted", &self.deleted)
            .finish()
    }
}

impl AtmSwitch {
    /// Creates a new switch and reserves its id in the manager's pool.
    ///
    /// A random id is generated when `node_id` is `None`. Nothing is sent to
    /// the hypervisor until [`Device::create`] is called; when `hypervisor`
    /// is `None`, `create()` asks the manager for a new one.
    pub fn new(
        name: impl Into<String>,
        node_id: Option<DeviceId>,
        project_id: Uuid,
        manager: Arc<dyn DeviceManager>,
        hypervisor: Option<Arc<Hypervisor>>,
    ) -> DynamipsResult<Self> {
        let id = node_id.unwrap_or_else(DeviceId::new_v4);
        if !manager.identifiers().reserve(id) {
            return Err(DynamipsError::invalid_config(
                "node_id",
                format!("identifier {} is already in use", id),
            ));
        }

        Ok(Self {
            name: name.into(),
            id,
            project_id,
            manager,
            hypervisor,
            nios: BTreeMap::new(),
            mappings: BTreeMap::new(),
            created: false,
            deleted: false,
        })
    }

    /// Creates a switch from its configuration (ports and mappings are
    /// applied separately, see [`AtmSwitch::apply_config`]).
    pub fn from_config(
        config: &AtmSwitchConfig,
        manager: Arc<dyn DeviceManager>,
        hypervisor: Option<Arc<Hypervisor>>,
    ) -> DynamipsResult<Self> {
        config.validate()?;
        Self::new(
            config.name.clone(),
            config.node_id,
            config.project_id,
            manager,
            hypervisor,
        )
    }

    /// Returns the hypervisor session, if one is bound.
    pub fn hypervisor(&self) -> Option<&Arc<Hypervisor>> {
        self.hypervisor.as_ref()
    }

    /// Returns true once the switch exists on the hypervisor.
    pub fn is_created(&self) -> bool {
        self.created && !self.deleted
    }

    /// Returns the port table.
    pub fn nios(&self) -> &BTreeMap<PortNumber, NioHandle> {
        &self.nios
    }

    /// Returns the circuit table.
    pub fn mappings(&self) -> &BTreeMap<CircuitKey, CircuitKey> {
        &self.mappings
    }

    /// Checks if a port exists on this switch.
    pub fn has_port(&self, port: PortNumber) -> bool {
        self.nios.contains_key(&port)
    }

    fn ensure_live(&self) -> DynamipsResult<()> {
        if self.deleted {
            return Err(DynamipsError::DeviceDeleted {
                device: self.context(),
            });
        }
        Ok(())
    }

    /// Returns the session of a switch that exists on the hypervisor.
    fn session(&self) -> DynamipsResult<Arc<Hypervisor>> {
        match &self.hypervisor {
            Some(hypervisor) if self.created => Ok(hypervisor.clone()),
            _ => Err(DynamipsError::NotCreated {
                device: self.context(),
            }),
        }
    }

    fn command_failed(&self, err: DynamipsError) -> DynamipsError {
        DynamipsError::for_device(self.context(), err)
    }

    fn nio(&self, port: PortNumber) -> DynamipsResult<NioHandle> {
        self.nios
            .get(&port)
            .cloned()
            .ok_or_else(|| DynamipsError::port_not_allocated(self.context(), port))
    }

    /// Builds the create/delete command for a circuit pair, checking that
    /// both ports are allocated and both keys have the same shape.
    fn circuit_cmd(
        &self,
        action: CircuitAction,
        source: CircuitKey,
        dest: CircuitKey,
    ) -> DynamipsResult<String> {
        let input_nio = self.nio(source.port())?;
        let output_nio = self.nio(dest.port())?;

        let cmd = match (action, source, dest) {
            (
                CircuitAction::Create,
                CircuitKey::Vp { vpi: vpi1, .. },
                CircuitKey::Vp { vpi: vpi2, .. },
            ) => build_create_vpc_cmd(&self.name, &input_nio, vpi1, &output_nio, vpi2),
            (
                CircuitAction::Delete,
                CircuitKey::Vp { vpi: vpi1, .. },
                CircuitKey::Vp { vpi: vpi2, .. },
            ) => build_delete_vpc_cmd(&self.name, &input_nio, vpi1, &output_nio, vpi2),
            (
                CircuitAction::Create,
                CircuitKey::Vc { vpi: vpi1, vci: vci1, .. },
                CircuitKey::Vc { vpi: vpi2, vci: vci2, .. },
            ) => build_create_vcc_cmd(
                &self.name, &input_nio, vpi1, vci1, &output_nio, vpi2, vci2,
            ),
            (
                CircuitAction::Delete,
                CircuitKey::Vc { vpi: vpi1, vci: vci1, .. },
                CircuitKey::Vc { vpi: vpi2, vci: vci2, .. },
            ) => build_delete_vcc_cmd(
                &self.name, &input_nio, vpi1, vci1, &output_nio, vpi2, vci2,
            ),
            _ => {
                return Err(DynamipsError::invalid_config(
                    "mappings",
                    format!("{} and {} are not the same circuit type", source, dest),
                ))
            }
        };
        Ok(cmd)
    }

    /// Adds a NIO as a new port on the switch.
    #[instrument(skip(self, nio), fields(device = %self.name, id = %self.id))]
    pub fn add_nio(&mut self, nio: NioHandle, port: PortNumber) -> DynamipsResult<()> {
        self.ensure_live()?;
        if self.nios.contains_key(&port) {
            return Err(DynamipsError::port_conflict(self.context(), port));
        }

        info!(
            "ATM switch \"{}\" [{}]: NIO {} bound to port {}",
            self.name, self.id, nio, port
        );
        self.nios.insert(port, nio);
        Ok(())
    }

    /// Removes the NIO bound to a port and returns it for cleanup.
    #[instrument(skip(self), fields(device = %self.name, id = %self.id))]
    pub fn remove_nio(&mut self, port: PortNumber) -> DynamipsResult<NioHandle> {
        self.ensure_live()?;
        let nio = self
            .nios
            .remove(&port)
            .ok_or_else(|| DynamipsError::port_not_allocated(self.context(), port))?;

        info!(
            "ATM switch \"{}\" [{}]: NIO {} removed from port {}",
            self.name, self.id, nio, port
        );
        Ok(nio)
    }

    /// Creates a Virtual Path connection from `(port1, vpi1)` to
    /// `(port2, vpi2)`. The connection is unidirectional.
    pub async fn map_vp(
        &mut self,
        port1: PortNumber,
        vpi1: Vpi,
        port2: PortNumber,
        vpi2: Vpi,
    ) -> DynamipsResult<()> {
        self.map_circuit(CircuitKey::vp(port1, vpi1), CircuitKey::vp(port2, vpi2))
            .await
    }

    /// Deletes a Virtual Path connection.
    pub async fn unmap_vp(
        &mut self,
        port1: PortNumber,
        vpi1: Vpi,
        port2: PortNumber,
        vpi2: Vpi,
    ) -> DynamipsResult<()> {
        self.unmap_circuit(CircuitKey::vp(port1, vpi1), CircuitKey::vp(port2, vpi2))
            .await
    }

    /// Creates a Virtual Channel connection (unidirectional).
    pub async fn map_pvc(
        &mut self,
        port1: PortNumber,
        vpi1: Vpi,
        vci1: Vci,
        port2: PortNumber,
        vpi2: Vpi,
        vci2: Vci,
    ) -> DynamipsResult<()> {
        self.map_circuit(
            CircuitKey::vc(port1, vpi1, vci1),
            CircuitKey::vc(port2, vpi2, vci2),
        )
        .await
    }

    /// Deletes a Virtual Channel connection.
    pub async fn unmap_pvc(
        &mut self,
        port1: PortNumber,
        vpi1: Vpi,
        vci1: Vci,
        port2: PortNumber,
        vpi2: Vpi,
        vci2: Vci,
    ) -> DynamipsResult<()> {
        self.unmap_circuit(
            CircuitKey::vc(port1, vpi1, vci1),
            CircuitKey::vc(port2, vpi2, vci2),
        )
        .await
    }

    /// Creates a connection between two circuits of the same shape.
    ///
    /// Mapping a source circuit that is already mapped replaces its
    /// destination.
    #[instrument(skip(self), fields(device = %self.name, id = %self.id))]
    pub async fn map_circuit(
        &mut self,
        source: CircuitKey,
        dest: CircuitKey,
    ) -> DynamipsResult<()> {
        self.ensure_live()?;
        let cmd = self.circuit_cmd(CircuitAction::Create, source, dest)?;
        let hypervisor = self.session()?;
        hypervisor
            .send(&cmd)
            .await
            .map_err(|e| self.command_failed(e))?;

        info!(
            "ATM switch \"{}\" [{}]: {} from {} to {} created",
            self.name,
            self.id,
            source.connection_kind(),
            source.describe(),
            dest.describe()
        );

        if let Some(previous) = self.mappings.insert(source, dest) {
            warn!(
                "ATM switch \"{}\" [{}]: {} {} was mapped to {}, now mapped to {}",
                self.name,
                self.id,
                source.connection_kind(),
                source,
                previous,
                dest
            );
        }
        Ok(())
    }

    /// Deletes a connection between two circuits of the same shape.
    #[instrument(skip(self), fields(device = %self.name, id = %self.id))]
    pub async fn unmap_circuit(
        &mut self,
        source: CircuitKey,
        dest: CircuitKey,
    ) -> DynamipsResult<()> {
        self.ensure_live()?;
        let cmd = self.circuit_cmd(CircuitAction::Delete, source, dest)?;
        if !self.mappings.contains_key(&source) {
            return Err(DynamipsError::circuit_not_mapped(self.context(), source));
        }
        let hypervisor = self.session()?;
        hypervisor
            .send(&cmd)
            .await
            .map_err(|e| self.command_failed(e))?;

        info!(
            "ATM switch \"{}\" [{}]: {} from {} to {} deleted",
            self.name,
            self.id,
            source.connection_kind(),
            source.describe(),
            dest.describe()
        );

        self.mappings.remove(&source);
        Ok(())
    }

    /// Starts a packet capture on a port.
    ///
    /// `data_link_type` defaults to `DLT_ATM_RFC1483`. The capture filter is
    /// bound in both directions, then configured with the normalized data
    /// link type and the output file. If the setup step fails the filter
    /// stays bound; call [`AtmSwitch::stop_capture`] to clear it.
    #[instrument(skip(self), fields(device = %self.name, id = %self.id))]
    pub async fn start_capture(
        &mut self,
        port: PortNumber,
        output_file: &str,
        data_link_type: Option<&str>,
    ) -> DynamipsResult<()> {
        self.ensure_live()?;
        let nio = self.nio(port)?;
        let data_link_type =
            normalize_data_link_type(data_link_type.unwrap_or(DEFAULT_DATA_LINK_TYPE));

        if nio.has_filter() {
            return Err(DynamipsError::filter_already_applied(self.context(), port));
        }

        nio.bind_filter(FilterDirection::Both, CAPTURE_FILTER)
            .await
            .map_err(|e| self.command_failed(e))?;
        nio.setup_filter(
            FilterDirection::Both,
            &build_capture_filter_args(&data_link_type, output_file),
        )
        .await
        .map_err(|e| self.command_failed(e))?;

        info!(
            "ATM switch \"{}\" [{}]: starting packet capture on port {}",
            self.name, self.id, port
        );
        Ok(())
    }

    /// Stops a packet capture on a port. Succeeds when no capture runs.
    #[instrument(skip(self), fields(device = %self.name, id = %self.id))]
    pub async fn stop_capture(&mut self, port: PortNumber) -> DynamipsResult<()> {
        self.ensure_live()?;
        let nio = self.nio(port)?;
        nio.unbind_filter(FilterDirection::Both)
            .await
            .map_err(|e| self.command_failed(e))?;

        info!(
            "ATM switch \"{}\" [{}]: stopping packet capture on port {}",
            self.name, self.id, port
        );
        Ok(())
    }

    /// Returns true if the capture filter is bound on the port's NIO.
    pub fn is_capturing(&self, port: PortNumber) -> DynamipsResult<bool> {
        let nio = self.nio(port)?;
        let capture = Some(CAPTURE_FILTER);
        Ok(nio.input_filter().as_deref() == capture || nio.output_filter().as_deref() == capture)
    }

    /// Adds the configured ports and maps the configured circuits.
    ///
    /// `resolve` turns a configured NIO name into a handle. Circuits are
    /// mapped in ascending source order; the first failure stops the
    /// sequence and leaves earlier ports and circuits in place.
    pub async fn apply_config<F>(
        &mut self,
        config: &AtmSwitchConfig,
        mut resolve: F,
    ) -> DynamipsResult<()>
    where
        F: FnMut(PortNumber, &str) -> DynamipsResult<NioHandle> + Send,
    {
        config.validate()?;

        for port in &config.ports {
            let nio = resolve(port.port, &port.nio)?;
            self.add_nio(nio, port.port)?;
        }
        for (source, dest) in &config.mappings {
            self.map_circuit(*source, *dest).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Device for AtmSwitch {
    fn kind(&self) -> &'static str {
        ATM_SWITCH_KIND
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> DeviceId {
        self.id
    }

    fn project_id(&self) -> Uuid {
        self.project_id
    }

    async fn create(&mut self) -> DynamipsResult<()> {
        self.ensure_live()?;

        let hypervisor = match &self.hypervisor {
            Some(hypervisor) => hypervisor.clone(),
            None => {
                let hypervisor = self
                    .manager
                    .start_new_hypervisor()
                    .await
                    .map_err(|e| self.command_failed(e))?;
                self.hypervisor = Some(hypervisor.clone());
                hypervisor
            }
        };

        hypervisor
            .send(&build_create_switch_cmd(&self.name))
            .await
            .map_err(|e| self.command_failed(e))?;
        info!(
            "ATM switch \"{}\" [{}] has been created",
            self.name, self.id
        );
        hypervisor.register_device(self.id);
        self.created = true;
        Ok(())
    }

    async fn rename(&mut self, new_name: &str) -> DynamipsResult<()> {
        self.ensure_live()?;
        let hypervisor = self.session()?;

        hypervisor
            .send(&build_rename_switch_cmd(&self.name, new_name))
            .await
            .map_err(|e| self.command_failed(e))?;
        info!(
            "ATM switch \"{}\" [{}]: renamed to \"{}\"",
            self.name, self.id, new_name
        );
        self.name = new_name.to_string();
        Ok(())
    }

    async fn delete(&mut self) -> DynamipsResult<()> {
        self.ensure_live()?;

        if self.created {
            let hypervisor = self.session()?;
            hypervisor
                .send(&build_delete_switch_cmd(&self.name))
                .await
                .map_err(|e| self.command_failed(e))?;
            hypervisor.unregister_device(self.id);
            info!(
                "ATM switch \"{}\" [{}] has been deleted",
                self.name, self.id
            );
        }

        self.manager.identifiers().release(self.id);
        self.deleted = true;
        Ok(())
    }
}
