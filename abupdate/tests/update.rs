// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! End-to-end update against a fixture device tree

use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    fs,
    os::unix::fs::symlink,
    path::{Path, PathBuf},
};

use abupdate::{
    bootconfig::Autoboot,
    layout::Origin,
    workspace::Filesystems,
    Configuration, Error, Label, PartitionSet, Updater, Vfs,
};

/// Mounting copies a per-device directory in, unmounting copies it back out
struct FakeFs {
    trees: PathBuf,
    mounted: RefCell<HashMap<PathBuf, String>>,
    read_only: Cell<bool>,
    remounts: Cell<usize>,
}

fn copy_tree(from: &Path, to: &Path) {
    for entry in fs::read_dir(from).expect("read_dir") {
        let entry = entry.expect("entry");
        let dest = to.join(entry.file_name());
        if entry.file_type().expect("file_type").is_dir() {
            fs::create_dir_all(&dest).expect("mkdir");
            copy_tree(&entry.path(), &dest);
        } else {
            fs::copy(entry.path(), &dest).expect("copy");
        }
    }
}

impl Filesystems for FakeFs {
    fn mount(&self, device: &Path, target: &Path, _: &str) -> Result<(), Error> {
        let name = device.file_name().expect("device name").to_string_lossy().to_string();
        let tree = self.trees.join(&name);
        fs::create_dir_all(&tree)?;
        copy_tree(&tree, target);
        self.mounted.borrow_mut().insert(target.into(), name);
        Ok(())
    }

    fn unmount(&self, target: &Path) -> Result<(), Error> {
        let name = self.mounted.borrow_mut().remove(target).expect("not mounted");
        copy_tree(target, &self.trees.join(name));
        for entry in fs::read_dir(target)? {
            let path = entry?.path();
            if path.is_dir() {
                fs::remove_dir_all(path)?;
            } else {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    fn is_read_only(&self, _: &Path) -> Result<bool, Error> {
        Ok(self.read_only.get())
    }

    fn remount(&self, _: &Path, read_only: bool) -> Result<(), Error> {
        self.read_only.set(read_only);
        self.remounts.set(self.remounts.get() + 1);
        Ok(())
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    root: PathBuf,
    config: Configuration,
    fs: FakeFs,
}

const DEVICE_SIZE: usize = 16 * 512;

/// 32 sector MBR image: boot is sectors 4..12, root is sectors 16..32
fn image_bytes() -> Vec<u8> {
    let mut data = vec![0u8; 32 * 512];
    data[440..444].copy_from_slice(&0xdead_beefu32.to_le_bytes());
    for (slot, (kind, first, sectors)) in [(0x0cu8, 4u32, 8u32), (0x83, 16, 16)].into_iter().enumerate() {
        let base = 446 + slot * 16;
        data[base + 4] = kind;
        data[base + 8..base + 12].copy_from_slice(&first.to_le_bytes());
        data[base + 12..base + 16].copy_from_slice(&sectors.to_le_bytes());
    }
    data[510] = 0x55;
    data[511] = 0xaa;
    data[4 * 512..12 * 512].fill(0xb0);
    data[16 * 512..].fill(0x7f);
    data
}

impl Fixture {
    fn new(running: &str) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = fs::canonicalize(dir.path()).expect("canonicalize");
        let dev = root.join("dev");
        let links = dev.join("disk").join("by-partuuid");
        fs::create_dir_all(&links).expect("by-partuuid");

        for n in 1..=5 {
            let name = format!("mmcblk0p{n}");
            fs::write(dev.join(&name), vec![0xeeu8; DEVICE_SIZE]).expect("device");
            symlink(format!("../../{name}"), links.join(format!("5e3da3da-0{n}"))).expect("symlink");

            let sys = root.join("sys").join("class").join("block").join(&name);
            fs::create_dir_all(&sys).expect("sysfs");
            fs::write(sys.join("size"), format!("{}\n", DEVICE_SIZE / 512)).expect("size");
        }

        let firmware = root.join("firmware");
        fs::create_dir_all(&firmware).expect("firmware");
        // freshly flashed card, no trial boot target yet
        let unarmed = Autoboot {
            boot_partition: 1,
            tryboot_partition: 1,
        };
        fs::write(firmware.join("autoboot.txt"), unarmed.to_string()).expect("autoboot");

        let proc = root.join("proc").join("self");
        fs::create_dir_all(&proc).expect("procfs");
        fs::write(
            proc.join("mounts"),
            format!(
                "{0}/{running} / ext4 rw,noatime 0 0\n{0}/mmcblk0p1 {1} vfat ro,relatime 0 0\n{0}/mmcblk0p5 /home ext4 rw 0 0\n",
                dev.display(),
                firmware.display()
            ),
        )
        .expect("mounts");

        let work = root.join("work");
        fs::create_dir_all(&work).expect("work");
        let trees = root.join("trees");
        fs::create_dir_all(&trees).expect("trees");

        let set = |label, boot: u32, part_root: u32| PartitionSet {
            label,
            boot: dev.join(format!("mmcblk0p{boot}")),
            root: dev.join(format!("mmcblk0p{part_root}")),
            boot_index: boot,
        };
        let config = Configuration {
            sets: vec![set(Label::A, 1, 2), set(Label::B, 3, 4)],
            home: dev.join("mmcblk0p5"),
            active_boot_mount: firmware,
            workspace: work,
            vfs: Vfs {
                sysfs: root.join("sys"),
                devfs: dev,
                procfs: root.join("proc"),
            },
            ..Default::default()
        };

        Self {
            _dir: dir,
            root,
            config,
            fs: FakeFs {
                trees,
                mounted: RefCell::new(HashMap::new()),
                read_only: Cell::new(true),
                remounts: Cell::new(0),
            },
        }
    }

    fn image(&self) -> PathBuf {
        let path = self.root.join("os.img.zst");
        fs::write(&path, zstd::encode_all(&image_bytes()[..], 3).expect("zstd")).expect("image");
        path
    }

    fn device(&self, name: &str) -> Vec<u8> {
        fs::read(self.root.join("dev").join(name)).expect("device")
    }

    fn tree_file(&self, device: &str, file: &str) -> String {
        fs::read_to_string(self.fs.trees.join(device).join(file)).expect("tree file")
    }

    fn workspace_is_clean(&self) -> bool {
        fs::read_dir(&self.config.workspace).expect("work").next().is_none()
    }
}

#[test]
fn update_a_to_b() {
    let fixture = Fixture::new("mmcblk0p2");
    let image = fixture.image();

    let updater = Updater::new(&fixture.config, &fixture.fs).expect("updater");
    let report = updater.update(&image).expect("update");

    assert_eq!(report.plan.state.active.label, Label::A);
    assert_eq!(report.plan.state.inactive.label, Label::B);
    assert_eq!(report.plan.layout.origin, Origin::Table(ptable::Kind::MBR));
    assert!(!report.plan.seekable);
    assert_eq!(report.written.boot, 8 * 512);
    assert_eq!(report.written.root, 16 * 512);

    // devices of B hold the image, A is untouched
    assert!(fixture.device("mmcblk0p3")[..4096].iter().all(|b| *b == 0xb0));
    assert!(fixture.device("mmcblk0p3")[4096..].iter().all(|b| *b == 0xee));
    assert!(fixture.device("mmcblk0p4").iter().all(|b| *b == 0x7f));
    assert!(fixture.device("mmcblk0p1").iter().all(|b| *b == 0xee));
    assert!(fixture.device("mmcblk0p2").iter().all(|b| *b == 0xee));

    assert_eq!(
        fixture.tree_file("mmcblk0p3", "cmdline.txt"),
        "console=serial0,115200 console=tty1 root=PARTUUID=5e3da3da-04 rootfstype=ext4 fsck.repair=yes rootwait\n"
    );
    assert!(fixture
        .tree_file("mmcblk0p3", "cmdline_fallback.txt")
        .contains("root=PARTUUID=5e3da3da-02 "));
    assert_eq!(
        fixture.tree_file("mmcblk0p3", "tryboot.txt"),
        "kernel=kernel8.img\nos_prefix=1:/\ncmdline=cmdline_fallback.txt\n"
    );
    assert_eq!(
        fixture.tree_file("mmcblk0p3", "autoboot.txt"),
        "[all]\ntryboot_a_b=1\nboot_partition=3\n\n[tryboot]\nboot_partition=1\n"
    );
    assert_eq!(
        fixture.tree_file("mmcblk0p4", "etc/fstab"),
        "PARTUUID=5e3da3da-04  /  ext4  defaults,noatime  0  1\n\
         PARTUUID=5e3da3da-03  /boot/firmware  vfat  defaults,ro  0  2\n\
         PARTUUID=5e3da3da-05  /home  ext4  defaults,noatime  0  2\n"
    );

    // active descriptor armed, read-only mount restored
    assert_eq!(
        fs::read_to_string(fixture.config.active_boot_mount.join("autoboot.txt")).expect("autoboot"),
        "[all]\ntryboot_a_b=1\nboot_partition=1\n\n[tryboot]\nboot_partition=3\n"
    );
    assert_eq!(report.armed.tryboot_partition, 3);
    assert_eq!(fixture.fs.remounts.get(), 2);
    assert!(fixture.fs.read_only.get());
    assert!(fixture.fs.mounted.borrow().is_empty());
    assert!(fixture.workspace_is_clean());

    let status = updater.status().expect("status");
    assert!(status.is_armed());
    assert_eq!(status.boot_read_only, Some(true));
    let active_boot = status.active_boot.expect("active boot device");
    assert_eq!(active_boot.mountpoint.as_ref(), Some(&fixture.config.active_boot_mount));
    assert_eq!(active_boot.part_uuid(), Some("5e3da3da-01"));
    assert_eq!(active_boot.size, DEVICE_SIZE as u64);
}

#[test]
fn update_twice_is_stable() {
    let fixture = Fixture::new("mmcblk0p2");
    let image = fixture.image();
    let updater = Updater::new(&fixture.config, &fixture.fs).expect("updater");

    let snapshot = || {
        let files = ["cmdline.txt", "cmdline_fallback.txt", "tryboot.txt", "autoboot.txt"]
            .map(|f| fixture.tree_file("mmcblk0p3", f));
        (
            fixture.device("mmcblk0p3"),
            fixture.device("mmcblk0p4"),
            files,
            fixture.tree_file("mmcblk0p4", "etc/fstab"),
            fs::read_to_string(fixture.config.active_boot_mount.join("autoboot.txt")).expect("autoboot"),
        )
    };

    let first = updater.update(&image).expect("first update");
    let after_first = snapshot();
    let second = updater.update(&image).expect("second update");
    let after_second = snapshot();

    assert_eq!(after_first, after_second);
    assert_eq!(first.artifacts, second.artifacts);
    assert_eq!(first.armed, second.armed);
    assert_eq!(first.written.boot, second.written.boot);
    assert_eq!(first.written.root, second.written.root);
    assert!(fixture.fs.read_only.get());
    assert!(fixture.workspace_is_clean());
}

#[test]
fn clamped_boot_copy_completes() {
    let fixture = Fixture::new("mmcblk0p2");
    // inactive boot device only holds 6 of the image's 8 boot sectors
    fs::write(fixture.root.join("sys/class/block/mmcblk0p3/size"), "6\n").expect("size");

    let updater = Updater::new(&fixture.config, &fixture.fs).expect("updater");
    let report = updater.update(fixture.image()).expect("update");

    assert_eq!(report.plan.capacity, 6 * 512);
    assert_eq!(report.plan.layout.boot_sectors, 8);
    assert_eq!(report.plan.layout.boot_copy_sectors, 6);
    assert!(report.plan.layout.is_clamped());
    assert_eq!(report.written.boot, 6 * 512);
    assert!(fixture.device("mmcblk0p3")[..3072].iter().all(|b| *b == 0xb0));
    assert!(fixture.device("mmcblk0p3")[3072..].iter().all(|b| *b == 0xee));

    // root is unaffected by the boot clamp
    assert_eq!(report.written.root, 16 * 512);
    assert!(fixture.device("mmcblk0p4").iter().all(|b| *b == 0x7f));

    assert_eq!(report.armed.tryboot_partition, 3);
    assert!(updater.status().expect("status").is_armed());
    assert!(fixture.workspace_is_clean());
}

#[test]
fn update_keeps_image_cmdline() {
    let fixture = Fixture::new("mmcblk0p4");
    // as shipped on the image's boot partition
    let tree = fixture.fs.trees.join("mmcblk0p1");
    fs::create_dir_all(&tree).expect("tree");
    fs::write(tree.join("cmdline.txt"), "console=tty1 root=PARTUUID=deadbeef-02 quiet\n").expect("cmdline");

    let updater = Updater::new(&fixture.config, &fixture.fs).expect("updater");
    let report = updater.update(fixture.image()).expect("update");

    assert_eq!(report.plan.state.inactive.label, Label::A);
    assert_eq!(
        fixture.tree_file("mmcblk0p1", "cmdline.txt"),
        "console=tty1 root=PARTUUID=5e3da3da-02 quiet\n"
    );
    assert_eq!(
        fixture.tree_file("mmcblk0p1", "cmdline_fallback.txt"),
        "console=tty1 root=PARTUUID=5e3da3da-04 quiet\n"
    );
    assert_eq!(
        fixture.tree_file("mmcblk0p1", "tryboot.txt"),
        "kernel=kernel8.img\nos_prefix=3:/\ncmdline=cmdline_fallback.txt\n"
    );
    assert_eq!(report.armed.boot_partition, 3);
    assert_eq!(report.armed.tryboot_partition, 1);
    assert!(fixture.device("mmcblk0p3").iter().all(|b| *b == 0xee));
}

#[test]
fn plan_writes_nothing() {
    let fixture = Fixture::new("mmcblk0p2");
    let updater = Updater::new(&fixture.config, &fixture.fs).expect("updater");
    let plan = updater.plan(fixture.image()).expect("plan");

    assert_eq!(plan.capacity, DEVICE_SIZE as u64);
    assert_eq!(plan.layout.boot_start, 4);
    assert_eq!(plan.layout.root_start, 16);
    assert_eq!(plan.identifiers.inactive_root.as_str(), "5e3da3da-04");
    assert!(fixture.device("mmcblk0p3").iter().all(|b| *b == 0xee));
    assert_eq!(fixture.fs.remounts.get(), 0);
    assert!(fixture.workspace_is_clean());

    let status = updater.status().expect("status");
    assert!(!status.is_armed());
}

#[test]
fn missing_identifier_aborts_before_writing() {
    let fixture = Fixture::new("mmcblk0p2");
    fs::remove_file(fixture.root.join("dev/disk/by-partuuid/5e3da3da-04")).expect("unlink");

    let updater = Updater::new(&fixture.config, &fixture.fs).expect("updater");
    let res = updater.update(fixture.image());
    assert!(matches!(res, Err(Error::NoIdentifier(_))));
    assert!(fixture.device("mmcblk0p3").iter().all(|b| *b == 0xee));
    assert!(fixture.device("mmcblk0p4").iter().all(|b| *b == 0xee));
    assert!(fixture.workspace_is_clean());
}

#[test]
fn unmanaged_root_aborts() {
    let fixture = Fixture::new("mmcblk0p5");
    let updater = Updater::new(&fixture.config, &fixture.fs).expect("updater");
    assert!(matches!(updater.update(fixture.image()), Err(Error::UnmanagedRoot(_))));
    assert!(fixture.device("mmcblk0p3").iter().all(|b| *b == 0xee));
}

#[test]
fn short_image_cleans_up() {
    let fixture = Fixture::new("mmcblk0p2");
    let image = fixture.root.join("os.img.gz");
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    std::io::Write::write_all(&mut encoder, &image_bytes()[..8 * 512]).expect("gzip");
    fs::write(&image, encoder.finish().expect("gzip")).expect("image");

    let updater = Updater::new(&fixture.config, &fixture.fs).expect("updater");
    assert!(matches!(updater.update(&image), Err(Error::ShortImage { .. })));
    assert!(fixture.workspace_is_clean());
    // the active descriptor was never armed
    assert!(!updater.status().expect("status").is_armed());
}
