//! Process and system resource instruments.
//!
//! Registers observable instruments polled on every export tick:
//! - `system_cpu_usage` (gauge, percent): average across all cores
//! - `system_memory_usage` (gauge, percent): used / total memory
//! - `system_disk_usage` (gauge, percent): used / total space of the root mount
//! - `process_cpu_usage` (gauge, percent): this process
//! - `process_memory_usage` (gauge, percent): process RSS / total memory
//! - `network_out` (observable counter, bytes): bytes sent over all interfaces

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use sysinfo::{Disks, Networks, Pid, ProcessRefreshKind, ProcessesToUpdate, System};

use crate::observability::metrics::{MetricsRegistry, ObservableKind, PollError, PollResult, Reading};

/// Shared sysinfo handles refreshed lazily by each callback.
struct ResourceSampler {
    system: Mutex<System>,
    disks: Mutex<Disks>,
    networks: Mutex<Networks>,
    pid: Pid,
}

impl ResourceSampler {
    fn new() -> Self {
        let mut system = System::new();
        // Initial refresh so the first CPU delta has a baseline
        system.refresh_cpu_usage();
        system.refresh_memory();

        Self {
            system: Mutex::new(system),
            disks: Mutex::new(Disks::new_with_refreshed_list()),
            networks: Mutex::new(Networks::new_with_refreshed_list()),
            pid: Pid::from_u32(std::process::id()),
        }
    }

    fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>, PollError> {
        mutex
            .lock()
            .map_err(|_| format!("{} sampler lock poisoned", what).into())
    }

    fn refresh_process(&self, system: &mut System) {
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[self.pid]),
            true,
            ProcessRefreshKind::nothing().with_cpu().with_memory(),
        );
    }

    fn system_cpu(&self) -> PollResult {
        let mut system = Self::lock(&self.system, "system")?;
        system.refresh_cpu_usage();
        Ok(Reading::from(system.global_cpu_usage()))
    }

    fn system_memory(&self) -> PollResult {
        let mut system = Self::lock(&self.system, "system")?;
        system.refresh_memory();
        percent(system.used_memory(), system.total_memory(), "memory")
    }

    fn system_disk(&self) -> PollResult {
        let mut disks = Self::lock(&self.disks, "disk")?;
        disks.refresh(true);
        let root = disks
            .list()
            .iter()
            .find(|d| d.mount_point() == Path::new("/"))
            .or_else(|| disks.list().first())
            .ok_or("no disks reported")?;
        let used = root.total_space().saturating_sub(root.available_space());
        percent(used, root.total_space(), "disk")
    }

    fn process_cpu(&self) -> PollResult {
        let mut system = Self::lock(&self.system, "system")?;
        self.refresh_process(&mut system);
        let process = system.process(self.pid).ok_or("current process not found")?;
        Ok(Reading::from(process.cpu_usage()))
    }

    fn process_memory(&self) -> PollResult {
        let mut system = Self::lock(&self.system, "system")?;
        system.refresh_memory();
        self.refresh_process(&mut system);
        let process = system.process(self.pid).ok_or("current process not found")?;
        percent(process.memory(), system.total_memory(), "memory")
    }

    fn network_out(&self) -> PollResult {
        let mut networks = Self::lock(&self.networks, "network")?;
        networks.refresh(true);
        let sent: u64 = networks.list().values().map(|data| data.total_transmitted()).sum();
        Ok(Reading::from(sent))
    }
}

fn percent(used: u64, total: u64, what: &str) -> PollResult {
    if total == 0 {
        return Err(format!("total {} reported as zero", what).into());
    }
    Ok(Reading::from(used as f64 / total as f64 * 100.0))
}

/// Register the resource instruments on `registry`.
pub fn register_resource_instruments(registry: &MetricsRegistry) {
    let sampler = Arc::new(ResourceSampler::new());

    let p = sampler.clone();
    registry.register_observable(
        "system_cpu_usage",
        "percent",
        "system cpu usage",
        ObservableKind::Gauge,
        move || p.system_cpu(),
    );
    let p = sampler.clone();
    registry.register_observable(
        "system_memory_usage",
        "percent",
        "system memory usage",
        ObservableKind::Gauge,
        move || p.system_memory(),
    );
    let p = sampler.clone();
    registry.register_observable(
        "system_disk_usage",
        "percent",
        "system disk usage",
        ObservableKind::Gauge,
        move || p.system_disk(),
    );
    let p = sampler.clone();
    registry.register_observable(
        "process_cpu_usage",
        "percent",
        "process cpu usage",
        ObservableKind::Gauge,
        move || p.process_cpu(),
    );
    let p = sampler.clone();
    registry.register_observable(
        "process_memory_usage",
        "percent",
        "process memory usage",
        ObservableKind::Gauge,
        move || p.process_memory(),
    );
    let p = sampler;
    registry.register_observable(
        "network_out",
        "bytes",
        "Bytes out",
        ObservableKind::Counter,
        move || p.network_out(),
    );

    tracing::info!("Resource instruments registered");
}
