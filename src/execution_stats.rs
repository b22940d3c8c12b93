// Loss of precision is allowable in this module's use cases.
#![allow(clippy::cast_precision_loss)]

//! Wall time, CPU time and peak memory of a batch of runs.
//!
//! The runner creates one `ExecutionProfilingCollector` before starting its
//! replicates, calls `refresh` while they execute, and turns it into
//! `ExecutionStatistics` once they have all finished.
use std::time::{Duration, Instant};

use bytesize::ByteSize;
use humantime::format_duration;
use serde_derive::Serialize;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

use crate::log::{debug, error, info};

/// How frequently we update the max memory used value.
const REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// Final statistics of a batch. If no day or no person was simulated, the
/// per-day and per-person statistics are zero.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ExecutionStatistics {
    pub max_memory_usage: u64,
    pub cpu_time: Duration,
    pub wall_time: Duration,

    pub replicates: usize,
    /// Simulated days summed over replicates.
    pub days: u64,
    pub wall_time_per_day: Duration,
    /// People in each replicate's network.
    pub population: u64,
    pub memory_per_person: u64,
}

pub struct ExecutionProfilingCollector {
    /// Batch start time, used to compute elapsed wall time
    start_time: Instant,
    /// We keep track of the last time we refreshed so that client code doesn't have to and can
    /// just call `ExecutionProfilingCollector::refresh` in its polling loop.
    last_refresh: Instant,
    /// The accumulated CPU time of the process in CPU-milliseconds at batch start
    start_cpu_time: u64,
    /// The maximum amount of real memory used by the process, polled during execution.
    max_memory_usage: u64,
    system: System,
    /// Current process, `None` on platforms sysinfo does not support
    process_id: Option<Pid>,
}

impl ExecutionProfilingCollector {
    #[must_use]
    pub fn new() -> ExecutionProfilingCollector {
        let process_id = sysinfo::get_current_pid().ok();
        let now = Instant::now();

        let mut collector = ExecutionProfilingCollector {
            start_time: now,
            last_refresh: now,
            start_cpu_time: 0,
            max_memory_usage: 0,
            system: System::new(),
            process_id,
        };
        if let Some(process_id) = process_id {
            debug!("profiling process {process_id}");
            collector.update_system_info(ProcessRefreshKind::nothing().with_cpu().with_memory());
            if let Some(process) = collector.system.process(process_id) {
                collector.max_memory_usage = process.memory();
                collector.start_cpu_time = process.accumulated_cpu_time();
            }
        }
        collector
    }

    /// Polls memory usage if at least `REFRESH_INTERVAL` has passed since the
    /// previous poll. Cheap to call in a tight loop.
    #[inline]
    pub fn refresh(&mut self) {
        if self.last_refresh.elapsed() >= REFRESH_INTERVAL {
            self.poll_memory();
            self.last_refresh = Instant::now();
        }
    }

    fn poll_memory(&mut self) {
        if let Some(pid) = self.process_id {
            self.update_system_info(ProcessRefreshKind::nothing().with_memory());
            if let Some(process) = self.system.process(pid) {
                self.max_memory_usage = self.max_memory_usage.max(process.memory());
            }
        }
    }

    /// Accumulated CPU time of the process in CPU-milliseconds since the batch started.
    pub fn cpu_time(&mut self) -> u64 {
        let Some(pid) = self.process_id else {
            return 0;
        };
        self.update_system_info(ProcessRefreshKind::nothing().with_cpu());
        self.system.process(pid).map_or(0, |process| {
            process
                .accumulated_cpu_time()
                .saturating_sub(self.start_cpu_time)
        })
    }

    fn update_system_info(&mut self, process_refresh_kind: ProcessRefreshKind) {
        if let Some(pid) = self.process_id {
            if self.system.refresh_processes_specifics(
                ProcessesToUpdate::Some(&[pid]),
                true,
                process_refresh_kind,
            ) < 1
            {
                error!("could not refresh process statistics");
            }
        }
    }

    /// Computes the final statistics for `replicates` runs that simulated `days`
    /// days in total over networks of `population` people.
    pub fn compute_final_statistics(
        &mut self,
        replicates: usize,
        days: u64,
        population: u64,
    ) -> ExecutionStatistics {
        self.poll_memory();
        let cpu_time = Duration::from_millis(self.cpu_time());
        let wall_time = self.start_time.elapsed();

        let wall_time_per_day = if days > 0 {
            Duration::from_secs_f64(wall_time.as_secs_f64() / days as f64)
        } else {
            Duration::ZERO
        };
        let memory_per_person = if population > 0 {
            self.max_memory_usage / population
        } else {
            0
        };

        ExecutionStatistics {
            max_memory_usage: self.max_memory_usage,
            cpu_time,
            wall_time,
            replicates,
            days,
            wall_time_per_day,
            population,
            memory_per_person,
        }
    }
}

impl Default for ExecutionProfilingCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Prints execution statistics to the console.
pub fn print_execution_statistics(summary: &ExecutionStatistics) {
    println!("━━━━ Execution Summary ━━━━");
    if summary.max_memory_usage == 0 {
        println!("Memory and CPU statistics are not available on your platform.");
    } else {
        println!(
            "{:<25}{}",
            "Max memory usage:",
            ByteSize::b(summary.max_memory_usage)
        );
        println!("{:<25}{}", "CPU time:", format_duration(summary.cpu_time));
    }
    println!("{:<25}{}", "Wall time:", format_duration(summary.wall_time));
    println!("{:<25}{}", "Replicates:", summary.replicates);
    println!("{:<25}{}", "Simulated days:", summary.days);
    if summary.days > 0 {
        println!(
            "{:<25}{}",
            "Wall time per day:",
            format_duration(summary.wall_time_per_day)
        );
    }
    if summary.population > 0 {
        println!("{:<25}{}", "Population:", summary.population);
        if summary.max_memory_usage > 0 {
            println!(
                "{:<25}{}",
                "Memory per person:",
                ByteSize::b(summary.memory_per_person)
            );
        }
    }
}

/// Logs execution statistics with the logging system.
pub fn log_execution_statistics(stats: &ExecutionStatistics) {
    info!(
        "{} replicates simulated {} days in {}",
        stats.replicates,
        stats.days,
        format_duration(stats.wall_time)
    );
    if stats.max_memory_usage > 0 {
        info!(
            "max memory usage {}, CPU time {}",
            ByteSize::b(stats.max_memory_usage),
            format_duration(stats.cpu_time)
        );
    }
}
