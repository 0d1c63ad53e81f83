// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Update management entry APIs

use std::path::Path;

use topology::disk::{self, device::BlockDevice, probe::Probe};

use crate::{
    bootconfig::{self, Autoboot, BootArtifacts, Generator},
    fstab::Fstab,
    image::{self, ImageSource},
    installer::{Installer, Written},
    layout::{self, ImageLayout},
    workspace::{Filesystems, ScopedMount, Workspace},
    ActiveState, Configuration, Error, Identifiers,
};

/// Scratch file holding the probed leading sectors of the image
const LAYOUT_SCRATCH: &str = "image-head.bin";

/// What an update would do, resolved without writing to any device
#[derive(Debug)]
pub struct Plan {
    pub state: ActiveState,
    pub identifiers: Identifiers,
    pub layout: ImageLayout,

    /// Capacity of the inactive boot device in bytes
    pub capacity: u64,

    /// Whether the image can be read from an offset without decompression
    pub seekable: bool,
}

/// Outcome of a completed update
#[derive(Debug)]
pub struct Report {
    pub plan: Plan,
    pub written: Written,
    pub artifacts: BootArtifacts,

    /// Descriptor now in place on the active boot partition
    pub armed: Autoboot,
}

/// Current A/B state of the system
#[derive(Debug)]
pub struct Status {
    pub state: ActiveState,
    pub identifiers: Identifiers,

    /// The active set's boot device, as far as it could be probed
    pub active_boot: Option<BlockDevice>,

    /// Whether the configured active boot mount is currently read-only
    pub boot_read_only: Option<bool>,

    /// The active boot partition's autoboot descriptor, if readable
    pub autoboot: Option<Autoboot>,
}

impl Status {
    /// Whether a `tryboot` reboot would start the inactive set
    pub fn is_armed(&self) -> bool {
        self.autoboot.is_some_and(|a| {
            a.boot_partition == self.state.active.boot_index && a.tryboot_partition == self.state.inactive.boot_index
        })
    }
}

/// Encapsulate the A/B update core APIs
pub struct Updater<'a> {
    config: &'a Configuration,
    probe: Probe,
    fs: &'a dyn Filesystems,
}

impl<'a> Updater<'a> {
    /// Construct a new Updater, probing the system described by `config.vfs`
    pub fn new(config: &'a Configuration, fs: &'a dyn Filesystems) -> Result<Self, Error> {
        config.validate()?;
        let probe = disk::builder::new()
            .with_sysfs(&config.vfs.sysfs)
            .with_devfs(&config.vfs.devfs)
            .with_procfs(&config.vfs.procfs)
            .build()?;
        Ok(Self { config, probe, fs })
    }

    /// Resolve the active and inactive sets from the live mount table
    pub fn state(&self) -> Result<ActiveState, Error> {
        ActiveState::resolve(self.config, &self.probe)
    }

    /// Report the current sets and whether a trial boot is armed
    pub fn status(&self) -> Result<Status, Error> {
        let state = self.state()?;
        let identifiers = Identifiers::lookup(&state, &self.probe)?;
        let active_boot = self
            .probe
            .get_device(&state.active.boot)
            .inspect_err(|e| log::warn!("Cannot inspect {}: {e}", state.active.boot.display()))
            .ok();
        let boot_read_only = self
            .probe
            .mounts()
            .find(&self.config.active_boot_mount)
            .map(|m| m.is_read_only());
        let autoboot = match bootconfig::read_autoboot(&self.config.active_boot_mount) {
            Ok(autoboot) => Some(autoboot),
            Err(e) => {
                log::warn!(
                    "No usable autoboot descriptor in {}: {e}",
                    self.config.active_boot_mount.display()
                );
                None
            }
        };
        Ok(Status {
            state,
            identifiers,
            active_boot,
            boot_read_only,
            autoboot,
        })
    }

    /// Resolve everything an update of `image` needs without touching any device
    pub fn plan(&self, image: impl AsRef<Path>) -> Result<Plan, Error> {
        let state = self.state()?;
        let identifiers = Identifiers::lookup(&state, &self.probe)?;
        let source = image::open(image)?;
        let workspace = Workspace::create(&self.config.workspace)?;
        self.inspect(state, identifiers, source.as_ref(), &workspace)
    }

    /// Install `image` onto the inactive set and arm a trial boot of it
    pub fn update(&self, image: impl AsRef<Path>) -> Result<Report, Error> {
        let state = self.state()?;
        let identifiers = Identifiers::lookup(&state, &self.probe)?;
        let source = image::open(image)?;
        self.check_active_boot_mount(&state);

        let workspace = Workspace::create(&self.config.workspace)?;
        let plan = self.inspect(state, identifiers, source.as_ref(), &workspace)?;

        let written = Installer::new(source.as_ref(), plan.layout).install(&plan.state.inactive)?;

        let generator = Generator::new(self.config, &plan.state, &plan.identifiers);
        let boot = ScopedMount::mount(
            self.fs,
            &plan.state.inactive.boot,
            &workspace.boot(),
            &self.config.boot_fstype,
        )?;
        let root = ScopedMount::mount(
            self.fs,
            &plan.state.inactive.root,
            &workspace.rootfs(),
            &self.config.root_fstype,
        )?;

        let artifacts = generator.write_inactive(boot.point())?;
        Fstab::for_set(self.config, &plan.identifiers).write(root.point())?;

        root.unmount()?;
        boot.unmount()?;

        let armed = generator.arm_active(self.fs)?;

        log::info!(
            "Set {} is ready, reboot with tryboot to start it",
            plan.state.inactive.label
        );

        Ok(Report {
            plan,
            written,
            artifacts,
            armed,
        })
    }

    fn inspect(
        &self,
        state: ActiveState,
        identifiers: Identifiers,
        source: &dyn ImageSource,
        workspace: &Workspace,
    ) -> Result<Plan, Error> {
        let capacity = self.probe.get_device_size(&state.inactive.boot)?;
        log::debug!("{} holds {capacity} bytes", state.inactive.boot.display());

        let layout = layout::inspect(source, capacity, workspace.scratch(LAYOUT_SCRATCH))?;

        Ok(Plan {
            state,
            identifiers,
            layout,
            capacity,
            seekable: source.is_seekable(),
        })
    }

    /// Warn when the configured active boot mount is not where the active boot device is mounted
    fn check_active_boot_mount(&self, state: &ActiveState) {
        let mount = &self.config.active_boot_mount;
        let device = match self.probe.get_device(&state.active.boot) {
            Ok(device) => device,
            Err(e) => {
                log::debug!("Cannot verify {}: {e}", mount.display());
                return;
            }
        };

        match device.mountpoint.as_deref() {
            Some(mountpoint) if mountpoint == mount => {
                log::debug!("{} is mounted at {}", device.path.display(), mount.display())
            }
            Some(mountpoint) => log::warn!(
                "{} is mounted at {}, expected {}",
                device.path.display(),
                mountpoint.display(),
                mount.display()
            ),
            None => log::warn!(
                "{} is not mounted, the trial boot will be armed in {}",
                device.path.display(),
                mount.display()
            ),
        }
    }
}
