//! End-to-end regeneration pipeline scenarios
//!
//! Drives the DHCP generator against an in-memory inventory and a fixed
//! resolver, then inspects the artifacts on disk: lease stanzas, boot
//! scripts, rebuild-from-scratch behavior and run-to-run stability.

use std::collections::BTreeMap;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::Path;
use std::sync::Arc;

use kestrel_common::{Device, DeviceConfig, DeviceKind, Image};
use kestrel_server::config::AppConfig;
use kestrel_server::dhcp::DhcpGenerator;
use kestrel_server::net::{FixedResolver, InterfaceResolver};
use kestrel_server::notify::NullSink;
use kestrel_server::scripts::ScriptWriter;
use kestrel_server::store::{InventoryStore, MemoryStore};
use kestrel_server::test_helpers::test_config;
use kestrel_ztp::TemplateSet;

struct Pipeline {
    generator: DhcpGenerator,
    store: Arc<dyn InventoryStore>,
    config: Arc<AppConfig>,
    _tmp: tempfile::TempDir,
}

fn pipeline(ipv6: Option<Ipv6Addr>) -> Pipeline {
    let tmp = tempfile::tempdir().unwrap();
    let config = Arc::new(test_config(&tmp));
    std::fs::create_dir_all(config.scripts_dir()).unwrap();
    std::fs::create_dir_all(config.configs_dir()).unwrap();

    let store: Arc<dyn InventoryStore> = Arc::new(MemoryStore::new());
    let resolver: Arc<dyn InterfaceResolver> = Arc::new(FixedResolver {
        ipv4: Some(Ipv4Addr::new(192, 0, 2, 1)),
        ipv6,
    });
    let templates = Arc::new(TemplateSet::from_dir(&config.templates_dir));
    let scripts = Arc::new(ScriptWriter::new(
        templates.clone(),
        resolver.clone(),
        config.scripts_dir(),
        config.web_port,
    ));
    let generator = DhcpGenerator::new(
        store.clone(),
        resolver,
        templates,
        scripts,
        Arc::new(NullSink),
        config.clone(),
    );

    Pipeline {
        generator,
        store,
        config,
        _tmp: tmp,
    }
}

async fn seed_example_inventory(store: &dyn InventoryStore) {
    let mut xr = Device::new("FXS001", "xr1", "192.168.1.10", DeviceKind::IosXr);
    xr.config = Some(DeviceConfig {
        name: "c1".to_string(),
        device_type: DeviceKind::IosXr,
        configuration: String::new(),
        location_url: "/configs/c1.conf".to_string(),
    });
    store.insert_device(&xr).await.unwrap();

    let mut nx = Device::new("FXS002", "nx1", "192.168.1.11", DeviceKind::NxOs);
    nx.image = Some(Image {
        name: "nx-img".to_string(),
        device_type: DeviceKind::NxOs,
        location_url: "/images/nx-img".to_string(),
    });
    nx.config = Some(DeviceConfig {
        name: "c2".to_string(),
        device_type: DeviceKind::NxOs,
        configuration: String::new(),
        location_url: "/configs/c2.conf".to_string(),
    });
    store.insert_device(&nx).await.unwrap();
}

/// Everything the pipeline produced, keyed for comparison.
fn snapshot(config: &AppConfig) -> BTreeMap<String, Vec<u8>> {
    let mut artifacts = BTreeMap::new();
    for path in [&config.dhcp4.config_path, &config.dhcp6.config_path] {
        artifacts.insert(
            path.file_name().unwrap().to_string_lossy().into_owned(),
            std::fs::read(path).unwrap(),
        );
    }
    for entry in std::fs::read_dir(config.scripts_dir()).unwrap() {
        let entry = entry.unwrap();
        artifacts.insert(
            entry.file_name().to_string_lossy().into_owned(),
            std::fs::read(entry.path()).unwrap(),
        );
    }
    artifacts
}

fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}

#[tokio::test]
async fn test_two_device_inventory_end_to_end() {
    let p = pipeline(None);
    seed_example_inventory(p.store.as_ref()).await;

    p.generator.generate().await;

    // Both stanzas land in the v4 config, in inventory order
    let conf = read(&p.config.dhcp4.config_path);
    let xr_at = conf.find("host xr1 {").expect("xr stanza present");
    let nx_at = conf.find("host nx1 {").expect("nx stanza present");
    assert!(xr_at < nx_at, "stanzas must follow inventory order");

    // Raw serial as v4 client identifier, generated script advertised
    assert!(conf.contains("option dhcp-client-identifier \"FXS001\";"));
    assert!(conf.contains("http://192.0.2.1:8080/scripts/FXS001.sh"));
    assert!(conf.contains("/tftboot/public/scripts/FXS002.py"));

    // Boot scripts keyed by serial, carrying their device's parameters
    let xr_script = read(&p.config.scripts_dir().join("FXS001.sh"));
    assert!(xr_script.contains("http://192.0.2.1:8080"));
    assert!(xr_script.contains("/configs/c1.conf"));

    let nx_script = read(&p.config.scripts_dir().join("FXS002.py"));
    assert!(nx_script.contains("\"c2.conf\""));
    assert!(nx_script.contains("\"nx-img\""));
}

#[tokio::test]
async fn test_regeneration_is_idempotent() {
    let p = pipeline(None);
    seed_example_inventory(p.store.as_ref()).await;

    p.generator.generate().await;
    let first = snapshot(&p.config);

    p.generator.generate().await;
    let second = snapshot(&p.config);

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_removed_device_loses_its_script() {
    let p = pipeline(None);
    seed_example_inventory(p.store.as_ref()).await;

    p.generator.generate().await;
    assert!(p.config.scripts_dir().join("FXS002.py").exists());

    p.store.delete_device("FXS002").await.unwrap();
    p.generator.generate().await;

    assert!(!p.config.scripts_dir().join("FXS002.py").exists());
    assert!(p.config.scripts_dir().join("FXS001.sh").exists());
    assert!(!read(&p.config.dhcp4.config_path).contains("host nx1 {"));
}

#[tokio::test]
async fn test_v6_config_written_without_v6_interface() {
    let p = pipeline(None);
    seed_example_inventory(p.store.as_ref()).await;

    p.generator.generate().await;

    // No IPv6 interface exists, yet the v6 file is still produced
    let conf6 = read(&p.config.dhcp6.config_path);
    assert!(conf6.contains("subnet6 2001:db8::/64"));
}

#[tokio::test]
async fn test_v6_device_uses_duid_and_v6_config() {
    let p = pipeline(Some("2001:db8::1".parse().unwrap()));

    let mut xr = Device::new("FXS010", "xr6", "2001:db8::10", DeviceKind::IosXr);
    xr.config = Some(DeviceConfig {
        name: "c6".to_string(),
        device_type: DeviceKind::IosXr,
        configuration: String::new(),
        location_url: "/configs/c6.conf".to_string(),
    });
    p.store.insert_device(&xr).await.unwrap();

    p.generator.generate().await;

    let conf6 = read(&p.config.dhcp6.config_path);
    assert!(conf6.contains("host xr6 {"));
    // 'F'=46 'X'=58 'S'=53 '0'=30 '1'=31 '0'=30, colon-joined with the DUID
    // prefix and trailing 00
    assert!(conf6.contains("00:02:00:00:00:09:46:58:53:30:31:30:00"));
    // The v6 stanza advertises the device config URL on this server
    assert!(conf6.contains("http://[2001:db8::1]:8080/configs/c6.conf"));

    // Nothing about this device leaks into the v4 config
    assert!(!read(&p.config.dhcp4.config_path).contains("xr6"));

    // The boot script still lands on disk, addressed via the v6 server URL
    let script = read(&p.config.scripts_dir().join("FXS010.sh"));
    assert!(script.contains("http://[2001:db8::1]:8080"));
}
