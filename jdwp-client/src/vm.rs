// VirtualMachine command set
//
// Version and capability discovery, class lookup and VM-wide resume.

use crate::commands::{class_status, command_sets, vm_commands};
use crate::connection::JdwpConnection;
use crate::protocol::JdwpResult;
use crate::reader::{put_string, read_bool, read_i32, read_string, read_u32, read_u64, read_u8};
use crate::types::{IdSizes, ReferenceTypeId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmVersion {
    pub description: String,
    pub jdwp_major: i32,
    pub jdwp_minor: i32,
    pub vm_version: String,
    pub vm_name: String,
}

impl VmVersion {
    /// MethodExitWithReturnValue arrived with JDWP 1.6
    pub fn supports_return_values(&self) -> bool {
        self.jdwp_major > 1 || (self.jdwp_major == 1 && self.jdwp_minor >= 6)
    }
}

/// A loaded reference type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassInfo {
    pub ref_type_tag: u8,
    pub type_id: ReferenceTypeId,
    pub signature: String,
    pub status: u32,
}

impl ClassInfo {
    pub fn is_prepared(&self) -> bool {
        self.status & class_status::PREPARED != 0
    }
}

/// The subset of CapabilitiesNew the breakpoint daemon consults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VmCapabilities {
    pub can_watch_field_modification: bool,
    pub can_watch_field_access: bool,
    pub can_use_instance_filters: bool,
    pub can_request_vm_death_event: bool,
    pub can_use_source_name_filters: bool,
}

impl JdwpConnection {
    pub async fn version(&self) -> JdwpResult<VmVersion> {
        let reply = self
            .command(command_sets::VIRTUAL_MACHINE, vm_commands::VERSION, Vec::new())
            .await?;
        let mut data = reply.as_slice();

        Ok(VmVersion {
            description: read_string(&mut data)?,
            jdwp_major: read_i32(&mut data)?,
            jdwp_minor: read_i32(&mut data)?,
            vm_version: read_string(&mut data)?,
            vm_name: read_string(&mut data)?,
        })
    }

    pub async fn id_sizes(&self) -> JdwpResult<IdSizes> {
        let reply = self
            .command(command_sets::VIRTUAL_MACHINE, vm_commands::ID_SIZES, Vec::new())
            .await?;
        let mut data = reply.as_slice();

        Ok(IdSizes {
            field_id: read_i32(&mut data)?,
            method_id: read_i32(&mut data)?,
            object_id: read_i32(&mut data)?,
            reference_type_id: read_i32(&mut data)?,
            frame_id: read_i32(&mut data)?,
        })
    }

    /// Signature format: `Lcom/example/MyClass;`
    pub async fn classes_by_signature(&self, signature: &str) -> JdwpResult<Vec<ClassInfo>> {
        let mut request = Vec::new();
        put_string(&mut request, signature);
        let reply = self
            .command(
                command_sets::VIRTUAL_MACHINE,
                vm_commands::CLASSES_BY_SIGNATURE,
                request,
            )
            .await?;
        let mut data = reply.as_slice();

        let count = read_i32(&mut data)?;
        let mut classes = Vec::with_capacity(count.max(0) as usize);
        for _ in 0..count {
            classes.push(ClassInfo {
                ref_type_tag: read_u8(&mut data)?,
                type_id: read_u64(&mut data)?,
                signature: signature.to_string(),
                status: read_u32(&mut data)?,
            });
        }
        Ok(classes)
    }

    pub async fn all_classes(&self) -> JdwpResult<Vec<ClassInfo>> {
        let reply = self
            .command(command_sets::VIRTUAL_MACHINE, vm_commands::ALL_CLASSES, Vec::new())
            .await?;
        let mut data = reply.as_slice();

        let count = read_i32(&mut data)?;
        let mut classes = Vec::with_capacity(count.max(0) as usize);
        for _ in 0..count {
            classes.push(ClassInfo {
                ref_type_tag: read_u8(&mut data)?,
                type_id: read_u64(&mut data)?,
                signature: read_string(&mut data)?,
                status: read_u32(&mut data)?,
            });
        }
        Ok(classes)
    }

    pub async fn capabilities(&self) -> JdwpResult<VmCapabilities> {
        let reply = self
            .command(
                command_sets::VIRTUAL_MACHINE,
                vm_commands::CAPABILITIES_NEW,
                Vec::new(),
            )
            .await?;
        // 32 booleans in a fixed order; only the ones we use are named
        let mut flags = [false; 32];
        let mut data = reply.as_slice();
        for flag in flags.iter_mut() {
            *flag = read_bool(&mut data)?;
        }

        Ok(VmCapabilities {
            can_watch_field_modification: flags[0],
            can_watch_field_access: flags[1],
            can_use_instance_filters: flags[11],
            can_request_vm_death_event: flags[13],
            can_use_source_name_filters: flags[18],
        })
    }

    pub async fn resume_all(&self) -> JdwpResult<()> {
        self.command(command_sets::VIRTUAL_MACHINE, vm_commands::RESUME, Vec::new())
            .await?;
        Ok(())
    }

    /// Detach; the VM clears every event request and resumes
    pub async fn dispose(&self) -> JdwpResult<()> {
        self.command(command_sets::VIRTUAL_MACHINE, vm_commands::DISPOSE, Vec::new())
            .await?;
        Ok(())
    }
}
