// Licensed under the Apache-2.0 license

mod common;

use boot_image::BootFlags;
use common::{Workspace, BSS_ADDR, BSS_SIZE, TEXT_ADDR, TEXT_SIZE};
use payload_builder::model::SET_NAME_PREFIX;
use payload_builder::{compile, inspect, CompileOptions, ConfigError, HartId, PrivMode};

fn compile_yaml(ws: &Workspace, yaml: &str) -> anyhow::Result<payload_builder::BootImage> {
    compile(&ws.config(yaml), &ws.output(), &CompileOptions::default())
}

#[test]
fn test_compile_elf_payload() {
    let ws = Workspace::new();
    let kernel = ws.file("kernel.elf", &common::riscv_elf(0x5A));
    let yaml = format!(
        "\
set-name: 'amp-demo'
hart-entry-points:
  u54_1: '0x80000000'
  u54_2: '0x80000000'
payloads:
  '{kernel}':
    exec-addr: '0x80000000'
    owner-hart: u54_1
    secondary-hart: u54_2
    priv-mode: prv_s
    payload-name: 'kernel'
    skip-opensbi: true
    allow-reboot: cold
"
    );
    let image = compile_yaml(&ws, &yaml).unwrap();
    assert_eq!(image.set_name.as_str(), "amp-demo");

    let summary = inspect(&common::read(&ws.output())).unwrap();
    let header = &summary.header;
    assert!(header.is_magic_valid());
    assert_eq!(header.set_name(), "amp-demo");

    let owner = &header.hart[HartId::U54_1.index()];
    assert_eq!(owner.entry_point, TEXT_ADDR);
    assert_eq!(owner.name(), "kernel");
    assert_eq!(owner.priv_mode, PrivMode::Supervisor.to_wire());
    assert_eq!(
        owner.boot_flags(),
        BootFlags::SKIP_OPENSBI | BootFlags::ALLOW_WARM_REBOOT | BootFlags::ALLOW_COLD_REBOOT
    );
    assert_eq!(owner.num_chunks, 1);

    let secondary = &header.hart[HartId::U54_2.index()];
    assert_eq!(secondary.priv_mode, PrivMode::Supervisor.to_wire());
    assert_eq!(secondary.boot_flags(), owner.boot_flags());
    assert_eq!(secondary.name(), "");
    assert_eq!(secondary.num_chunks, 0);

    assert_eq!(summary.chunks.len(), 1);
    let chunk = &summary.chunks[0];
    assert_eq!(chunk.owner, HartId::U54_1.wire_id());
    assert_eq!(chunk.exec_addr, TEXT_ADDR);
    assert_eq!(chunk.size, TEXT_SIZE as u64);

    assert_eq!(summary.zi_chunks.len(), 1);
    assert_eq!(summary.zi_chunks[0].exec_addr, BSS_ADDR);
    assert_eq!(summary.zi_chunks[0].size, BSS_SIZE);

    payload_builder::dump_payload(&ws.output(), true).unwrap();
}

#[test]
fn test_compile_blob_with_ancillary_data() {
    let ws = Workspace::new();
    let blob = ws.file("u-boot.bin", &[0x11; 13]);
    let dtb = ws.file("board.dtb", &[0x22; 6]);
    let yaml = format!(
        "\
payloads:
  '{blob}':
    exec-addr: '0x80200000'
    owner-hart: u54_4
    priv-mode: prv_s
    skip-autoboot: 1
    ancilliary-data: '{dtb}'
"
    );
    let image = compile_yaml(&ws, &yaml).unwrap();
    assert_eq!(image.set_name.as_str(), format!("{SET_NAME_PREFIX}{blob}"));

    let bytes = common::read(&ws.output());
    let summary = inspect(&bytes).unwrap();
    assert_eq!(summary.chunks.len(), 2);
    assert!(summary.zi_chunks.is_empty());
    assert_eq!(summary.chunks[0].exec_addr, 0x8020_0000);
    assert_eq!(summary.chunks[1].exec_addr, 0x8020_0010);
    assert_eq!(summary.chunk_runs(), vec![(HartId::U54_4.wire_id(), 2)]);

    let start = summary.chunks[1].load_addr as usize;
    assert_eq!(&bytes[start..start + 6], &[0x22; 6]);

    let hart = &summary.header.hart[HartId::U54_4.index()];
    assert_eq!(
        hart.boot_flags(),
        BootFlags::SKIP_AUTOBOOT | BootFlags::ANCILLARY_DATA
    );
    assert_eq!((hart.first_chunk, hart.last_chunk, hart.num_chunks), (0, 1, 2));
    assert_eq!(summary.header.boot_image_length as usize, bytes.len());
}

#[test]
fn test_entry_points_without_payloads() {
    let ws = Workspace::new();
    let yaml = "\
hart-entry-points:
  u54_1: '0x80200000'
  u54_2: '0x80200000'
  u54_3: '0x80200000'
  u54_4: 2151677952
payloads: {}
";
    compile_yaml(&ws, yaml).unwrap();
    let summary = inspect(&common::read(&ws.output())).unwrap();
    assert!(summary.chunks.is_empty());
    assert_eq!(summary.header.set_name(), SET_NAME_PREFIX);
    let expected = [0x8020_0000, 0x8020_0000, 0x8020_0000, 0x8040_0000];
    for (hart, entry_point) in summary.header.hart.iter().zip(expected) {
        assert_eq!(hart.entry_point, entry_point);
        assert_eq!(hart.priv_mode, PrivMode::Unset.to_wire());
        assert_eq!(hart.flags, 0);
        assert_eq!(hart.name(), "");
    }
}

#[test]
fn test_set_name_stops_after_first_override() {
    let ws = Workspace::new();
    let p1 = ws.file("p1.bin", b"one");
    let p2 = ws.file("p2.bin", b"two");
    let p3 = ws.file("p3.bin", b"three");
    let yaml = format!(
        "\
payloads:
  '{p1}':
    owner-hart: u54_1
  '{p2}':
    owner-hart: u54_2
    payload-name: 'second'
  '{p3}':
    owner-hart: u54_3
"
    );
    let image = compile_yaml(&ws, &yaml).unwrap();
    assert_eq!(
        image.set_name.as_str(),
        format!("{SET_NAME_PREFIX}{p1}+second")
    );
    assert_eq!(image.hart(HartId::U54_3).name.as_str(), p3);

    let summary = inspect(&common::read(&ws.output())).unwrap();
    assert_eq!(summary.header.set_name(), image.set_name.as_str());
    assert_eq!(summary.chunk_runs(), vec![(1, 1), (2, 1), (3, 1)]);
}

#[test]
fn test_owner_priv_mode_overwritten() {
    let ws = Workspace::new();
    let a = ws.file("a.bin", b"a");
    let b = ws.file("b.bin", b"b");
    let yaml = format!(
        "\
payloads:
  '{a}':
    owner-hart: u54_1
    priv-mode: prv_m
    skip-opensbi: true
  '{b}':
    owner-hart: u54_1
    priv-mode: prv_u
"
    );
    let image = compile_yaml(&ws, &yaml).unwrap();
    let hart = image.hart(HartId::U54_1);
    assert_eq!(hart.priv_mode, PrivMode::User);
    // Flags are assigned per payload, not merged.
    assert!(hart.flags.is_empty());
    assert_eq!(hart.name.as_str(), format!("{a}+{b}"));
}

#[test]
fn test_secondary_priv_mode_conflict_writes_nothing() {
    let ws = Workspace::new();
    let a = ws.file("a.bin", b"a");
    let b = ws.file("b.bin", b"b");
    let yaml = format!(
        "\
payloads:
  '{a}':
    owner-hart: u54_1
    secondary-hart: u54_2
    priv-mode: prv_s
  '{b}':
    owner-hart: u54_4
    secondary-hart: u54_2
    priv-mode: prv_s
"
    );
    let err = compile_yaml(&ws, &yaml).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ConfigError>(),
        Some(ConfigError::PrivModeConflict {
            hart: HartId::U54_2,
            ..
        })
    ));
    assert!(err.to_string().contains("U54_2"));
    assert!(!ws.output().exists());
}

#[test]
fn test_missing_owner_writes_nothing() {
    let ws = Workspace::new();
    let a = ws.file("a.bin", b"a");
    let yaml = format!(
        "\
payloads:
  '{a}':
    exec-addr: '0x1000'
    priv-mode: prv_m
"
    );
    let err = compile_yaml(&ws, &yaml).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ConfigError>(),
        Some(ConfigError::PrivModeWithoutOwner { .. })
    ));
    assert!(!ws.output().exists());

    let yaml = format!("payloads:\n  '{a}':\n    exec-addr: '0x1000'\n");
    let err = compile_yaml(&ws, &yaml).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ConfigError>(),
        Some(ConfigError::MissingOwner { .. })
    ));
    assert!(!ws.output().exists());
}

#[test]
fn test_payload_errors() {
    let ws = Workspace::new();
    let empty = ws.file("empty.bin", b"");
    let yaml = format!("payloads:\n  '{empty}':\n    owner-hart: u54_1\n");
    let err = compile_yaml(&ws, &yaml).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ConfigError>(),
        Some(ConfigError::Payload(_))
    ));
    assert!(!ws.output().exists());

    let missing = ws.path("missing.bin");
    let yaml = format!(
        "payloads:\n  '{}':\n    owner-hart: u54_1\n",
        missing.display()
    );
    let err = compile_yaml(&ws, &yaml).unwrap_err();
    assert!(err.to_string().contains("missing.bin"));
    assert!(!ws.output().exists());
}

#[test]
fn test_config_errors() {
    let ws = Workspace::new();
    for yaml in [
        "unknown-key: 1\n",
        "hart-entry-points:\n  u54_5: 0x1000\n",
        "hart-entry-points:\n  u54_1: nowhere\n",
        "payloads:\n  - a.bin\n",
        "set-name: [unterminated\n",
    ] {
        assert!(compile_yaml(&ws, yaml).is_err(), "accepted {yaml:?}");
        assert!(!ws.output().exists());
    }

    let err = compile(
        &ws.path("nonexistent.yaml"),
        &ws.output(),
        &CompileOptions::default(),
    )
    .unwrap_err();
    assert!(err.to_string().contains("nonexistent.yaml"));
}

#[test]
fn test_prefix_tokens_option() {
    let ws = Workspace::new();
    let yaml = "hart-entry-points:\n  u54_1st: '0x1000'\n";
    assert!(compile_yaml(&ws, yaml).is_err());

    let options = CompileOptions {
        token_match: payload_builder::TokenMatch::Prefix,
        wide_output: false,
    };
    let image = compile(&ws.config(yaml), &ws.output(), &options).unwrap();
    assert_eq!(image.hart(HartId::U54_1).entry_point, Some(0x1000));
}
