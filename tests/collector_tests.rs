//! Integration tests for `DataCollector` against a mock host root.
//!
//! Each test builds a temporary directory laid out like `/` (procfs and sysfs
//! files plus shell scripts standing in for lscpu, df and lsblk) and points
//! the collector at it.

use parking_lot::{const_mutex, Mutex};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::mpsc;
use std::time::Duration;
use tempfile::TempDir;

use vm_perfmetrics::collectors::identity::MmaIds;
use vm_perfmetrics::counter::CounterModulus;
use vm_perfmetrics::{CollectorError, DataCollector, EngineConfig, MetricsEngine, PerfCollector};

/// Exec-ing a script while another test thread still holds it open for
/// writing fails with ETXTBSY; tests in this file run one at a time.
static EXEC_LOCK: Mutex<()> = const_mutex(());

const GUID: &str = "3f2a9c1e-0b7d-4e55-9a61-2c8d0e4f7a10";

const LSCPU_64: &str = r##"if [ "$1" = "-p" ]; then
  echo "# CPU,Core,Socket,Node,,L1d,L1i,L2,L3"
  echo "0,0,0,0,,0,0,0,0"
  echo "1,0,0,0,,0,0,0,0"
  echo "2,1,0,0,,1,1,1,0"
  echo "3,1,0,0,,1,1,1,0"
else
  echo "Architecture:        x86_64"
  echo "CPU op-mode(s):      32-bit, 64-bit"
fi
"##;

const LSCPU_32: &str = r#"if [ "$1" = "-p" ]; then
  echo "0,0,0,0,,0,0,0,0"
else
  echo "CPU op-mode(s):      32-bit"
fi
"#;

const DF: &str = r#"echo "Type     Filesystem     Mounted on     1B-blocks        Avail"
echo "ext4     /dev/sda1      /              10737418240      5368709120"
echo "tmpfs    tmpfs          /run           1048576          1048576"
echo "ext3     /dev/sdb1      /data          2147483648       1073741824"
"#;

const LSBLK: &str = r#"cat <<'EOF'
{"blockdevices": [
  {"name": "/dev/sda", "fstype": null, "log-sec": 512},
  {"name": "/dev/sdb", "fstype": null, "log-sec": "4096"}
]}
EOF
"#;

struct MockRoot {
    dir: TempDir,
}

impl MockRoot {
    /// A host with four 64-bit CPUs, two ext filesystems, two block devices
    /// and one routed interface.
    fn new() -> Self {
        let root = MockRoot {
            dir: tempfile::tempdir().unwrap(),
        };
        root.write(
            "proc/meminfo",
            "MemTotal:        8167848 kB\nMemFree:          367324 kB\nMemAvailable:    4194304 kB\n",
        );
        root.write("proc/uptime", "1000.50 3600.25\n");
        root.set_net("10", "20", "100", "200");
        root.write(
            "proc/net/route",
            "Iface\tDestination\tGateway\tFlags\nhost0\t00000000\t0100A8C0\t0003\n",
        );
        fs::create_dir_all(root.path().join("sys/devices/virtual/net/lo")).unwrap();
        root.write("sys/class/block/sda/stat", "100 0 2000 0 50 0 1000 0 0 0 0\n");
        root.script("usr/bin/lscpu", LSCPU_64);
        root.script("bin/df", DF);
        root.script("bin/lsblk", LSBLK);
        root.write(
            &format!("etc/opt/microsoft/omsagent/{}/conf/omsadmin.conf", GUID),
            &format!("WORKSPACE_ID=ws\nAGENT_GUID={}\n", GUID),
        );
        root
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn write(&self, relative: &str, content: &str) {
        let path = self.path().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn script(&self, relative: &str, body: &str) {
        self.write(relative, &format!("#!/bin/sh\n{}", body));
        let path = self.path().join(relative);
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    /// `host0` is routed (up), `host1` is not, `lo` is virtual.
    fn set_net(&self, host0_rx: &str, host0_tx: &str, host1_rx: &str, host1_tx: &str) {
        self.write(
            "proc/net/dev",
            &format!(
                "Inter-|   Receive                                                |  Transmit\n \
                 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed\n\
                 lo: 5000 50 0 0 0 0 0 0 5000 50 0 0 0 0 0 0\n\
                 host0: {} 1 0 0 0 0 0 0 {} 1 0 0 0 0 0 0\n\
                 host1: {} 1 0 0 0 0 0 0 {} 1 0 0 0 0 0 0\n",
                host0_rx, host0_tx, host1_rx, host1_tx
            ),
        );
    }

    fn collector(&self) -> DataCollector {
        DataCollector::new(self.path())
    }
}

#[test]
fn test_baseline_returns_cpu_times() {
    let _guard = EXEC_LOCK.lock();
    let root = MockRoot::new();
    let mut collector = root.collector();

    let times = collector.baseline().unwrap();
    assert_eq!(times.uptime, 1000.50);
    assert_eq!(times.idle, 3600.25);
    assert_eq!(collector.counter_modulus(), Some(CounterModulus::Bits64));
}

#[test]
fn test_getters_before_baseline_fail() {
    let _guard = EXEC_LOCK.lock();
    let root = MockRoot::new();
    let mut collector = root.collector();

    assert!(matches!(
        collector.get_mma_ids(),
        Err(CollectorError::NotBaselined)
    ));
    assert!(matches!(
        collector.get_net_stats(),
        Err(CollectorError::NotBaselined)
    ));
    assert!(matches!(
        collector.get_disk_stats("/dev/sda"),
        Err(CollectorError::NotBaselined)
    ));

    // Stateless getters work without a baseline
    assert_eq!(
        collector.get_available_memory_kb().unwrap(),
        (4194304, 8167848)
    );
    assert_eq!(collector.get_cpu_idle().unwrap().uptime, 1000.50);
}

#[test]
fn test_mma_ids_and_cpu_count() {
    let _guard = EXEC_LOCK.lock();
    let root = MockRoot::new();
    let mut collector = root.collector();
    collector.baseline().unwrap();

    assert_eq!(
        collector.get_mma_ids().unwrap(),
        MmaIds::Single(GUID.to_string())
    );
    assert_eq!(collector.get_number_of_cpus().unwrap(), 4);
}

#[test]
fn test_cpu_count_failure_is_deferred() {
    let _guard = EXEC_LOCK.lock();
    let root = MockRoot::new();
    root.script("usr/bin/lscpu", "exit 1\n");
    let mut collector = root.collector();

    // Baseline still succeeds and assumes 64-bit counters
    collector.baseline().unwrap();
    assert_eq!(collector.counter_modulus(), Some(CounterModulus::Bits64));

    let err = collector.get_number_of_cpus().unwrap_err();
    assert!(err.is_unavailable(), "{:?}", err);
}

#[test]
fn test_no_cpus_found() {
    let _guard = EXEC_LOCK.lock();
    let root = MockRoot::new();
    root.script(
        "usr/bin/lscpu",
        "if [ \"$1\" = \"-p\" ]; then echo '# no data'; else echo 'CPU op-mode(s): 64-bit'; fi\n",
    );
    let mut collector = root.collector();
    collector.baseline().unwrap();

    let err = collector.get_number_of_cpus().unwrap_err();
    assert_eq!(err.to_string(), "No CPUs found");
}

#[test]
fn test_word_width_kept_when_no_cpus_listed() {
    let _guard = EXEC_LOCK.lock();
    let root = MockRoot::new();
    root.script(
        "usr/bin/lscpu",
        "if [ \"$1\" = \"-p\" ]; then echo '# none'; else echo 'CPU op-mode(s): 32-bit'; fi\n",
    );
    let mut collector = root.collector();
    collector.baseline().unwrap();

    assert_eq!(collector.counter_modulus(), Some(CounterModulus::Bits32));
    assert_eq!(
        collector.get_number_of_cpus().unwrap_err().to_string(),
        "No CPUs found"
    );
}

#[test]
fn test_missing_lscpu() {
    let _guard = EXEC_LOCK.lock();
    let root = MockRoot::new();
    fs::remove_file(root.path().join("usr/bin/lscpu")).unwrap();
    let mut collector = root.collector();
    collector.baseline().unwrap();

    assert!(collector.get_number_of_cpus().unwrap_err().is_unavailable());
    assert_eq!(collector.counter_modulus(), Some(CounterModulus::Bits64));
}

#[test]
fn test_net_stats_delta() {
    let _guard = EXEC_LOCK.lock();
    let root = MockRoot::new();
    let mut collector = root.collector();
    collector.baseline().unwrap();

    root.set_net("15", "25", "100", "200");
    let stats = collector.get_net_stats().unwrap();

    // host1 is down and idle, lo is virtual
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].device, "host0");
    assert_eq!(stats[0].bytes_received, 5);
    assert_eq!(stats[0].bytes_sent, 5);

    // The saved snapshot moved forward
    let stats = collector.get_net_stats().unwrap();
    assert_eq!(stats[0].bytes_received, 0);
    assert_eq!(stats[0].bytes_sent, 0);
}

#[test]
fn test_down_interface_with_traffic_is_reported() {
    let _guard = EXEC_LOCK.lock();
    let root = MockRoot::new();
    let mut collector = root.collector();
    collector.baseline().unwrap();

    root.set_net("10", "20", "150", "200");
    let stats = collector.get_net_stats().unwrap();
    let devices: Vec<&str> = stats.iter().map(|d| d.device.as_str()).collect();
    assert_eq!(devices, vec!["host0", "host1"]);
    assert_eq!(stats[1].bytes_received, 50);
    assert_eq!(stats[1].bytes_sent, 0);
}

#[test]
fn test_net_counter_rollover_64_bit() {
    let _guard = EXEC_LOCK.lock();
    let root = MockRoot::new();
    root.set_net("18446744073709551615", "20", "100", "200");
    let mut collector = root.collector();
    collector.baseline().unwrap();

    root.set_net("23", "20", "100", "200");
    let stats = collector.get_net_stats().unwrap();
    assert_eq!(stats[0].device, "host0");
    assert_eq!(stats[0].bytes_received, 24);
}

#[test]
fn test_net_counter_rollover_32_bit() {
    let _guard = EXEC_LOCK.lock();
    let root = MockRoot::new();
    root.script("usr/bin/lscpu", LSCPU_32);
    root.set_net("4294967295", "20", "100", "200");
    let mut collector = root.collector();
    collector.baseline().unwrap();
    assert_eq!(collector.counter_modulus(), Some(CounterModulus::Bits32));

    root.set_net("5", "20", "100", "200");
    let stats = collector.get_net_stats().unwrap();
    assert_eq!(stats[0].bytes_received, 6);
}

#[test]
fn test_disk_stats_since_baseline() {
    let _guard = EXEC_LOCK.lock();
    let root = MockRoot::new();
    let mut collector = root.collector();
    collector.baseline().unwrap();

    root.write("sys/class/block/sda/stat", "110 0 2010 0 53 0 1004 0 0 0 0\n");
    let stats = collector.get_disk_stats("/dev/sda").unwrap();
    assert_eq!(stats.device, "/dev/sda");
    assert_eq!(stats.reads, 10);
    assert_eq!(stats.bytes_read, 10 * 512);
    assert_eq!(stats.writes, 3);
    assert_eq!(stats.bytes_written, 4 * 512);
}

#[test]
fn test_disk_stats_new_device_needs_two_samples() {
    let _guard = EXEC_LOCK.lock();
    let root = MockRoot::new();
    let mut collector = root.collector();
    // sdb has no stat node at baseline time
    collector.baseline().unwrap();

    root.write("sys/class/block/sdb/stat", "1 0 8 0 1 0 8 0 0 0 0\n");
    let err = collector.get_disk_stats("/dev/sdb").unwrap_err();
    assert_eq!(err.to_string(), "no previous data for /dev/sdb");

    root.write("sys/class/block/sdb/stat", "2 0 16 0 1 0 8 0 0 0 0\n");
    let stats = collector.get_disk_stats("/dev/sdb").unwrap();
    assert_eq!(stats.reads, 1);
    assert_eq!(stats.bytes_read, 8 * 4096);
    assert_eq!(stats.bytes_written, 0);
}

#[test]
fn test_disk_stats_unknown_device() {
    let _guard = EXEC_LOCK.lock();
    let root = MockRoot::new();
    let mut collector = root.collector();
    collector.baseline().unwrap();

    let err = collector.get_disk_stats("/dev/nvme0n1").unwrap_err();
    assert!(err.is_unavailable(), "{:?}", err);
    assert!(matches!(
        collector.get_disk_stats("nvme0n1"),
        Err(CollectorError::InvalidDevice(_))
    ));
}

#[test]
fn test_filesystems() {
    let _guard = EXEC_LOCK.lock();
    let root = MockRoot::new();
    let collector = root.collector();

    let filesystems = collector.get_filesystems().unwrap();
    assert_eq!(filesystems.len(), 2);
    assert_eq!(filesystems[0].device, "/dev/sda1");
    assert_eq!(filesystems[0].mount_point, "/");
    assert_eq!(filesystems[0].size_bytes, 10737418240);
    assert_eq!(filesystems[0].free_bytes, 5368709120);
    assert_eq!(filesystems[1].mount_point, "/data");
}

#[test]
fn test_filesystems_when_df_fails() {
    let _guard = EXEC_LOCK.lock();
    let root = MockRoot::new();
    root.script("bin/df", "exit 2\n");
    let collector = root.collector();

    assert!(collector.get_filesystems().unwrap_err().is_unavailable());
}

#[test]
fn test_engine_delivers_batches_from_host_root() {
    let _guard = EXEC_LOCK.lock();
    let root = MockRoot::new();
    let config = EngineConfig::new(Box::new(root.collector()))
        .with_poll_interval(Duration::from_secs(1))
        .with_computer("mock-host");

    let (tx, rx) = mpsc::channel();
    let mut engine = MetricsEngine::new();
    engine
        .start(config, move |batch| {
            let _ = tx.send(batch);
            Ok(())
        })
        .unwrap();

    let batch = rx.recv_timeout(Duration::from_secs(10)).unwrap();
    engine.stop();

    let names: Vec<(&str, &str)> = batch
        .iter()
        .map(|t| (t.namespace.as_str(), t.name.as_str()))
        .collect();
    assert_eq!(names[0], ("Computer", "Heartbeat"));
    assert!(names.contains(&("Memory", "AvailableMB")));
    assert!(names.contains(&("LogicalDisk", "FreeSpacePercentage")));
    assert!(names.contains(&("Network", "ReadBytesPerSecond")));

    for tuple in &batch {
        assert_eq!(tuple.origin, "vm.azm.ms");
        assert_eq!(tuple.computer.as_deref(), Some("mock-host"));
        assert_eq!(
            tuple.tag_map()["vm.azm.ms/machineId"],
            format!("m-{}", GUID)
        );
    }

    let memory = batch.iter().find(|t| t.name == "AvailableMB").unwrap();
    assert_eq!(memory.value, 4096.0);

    let free = batch
        .iter()
        .find(|t| t.name == "FreeSpacePercentage")
        .unwrap();
    assert_eq!(free.value, 50.0);
    assert_eq!(free.tag_map()["vm.azm.ms/mountId"], "/");
}
