//! Edge-triggered GPIO input through the sysfs GPIO interface.
//!
//! With `edge` set, the kernel flags the line's `value` file with
//! `POLLPRI` on every matching transition. A dedicated thread blocks in
//! `poll(2)` on it and invokes the callback once per wake-up, then reads
//! the file back to re-arm it.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::os::fd::AsFd;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};

use super::write_attr;
use crate::hw_trait::{Edge, EdgeCallback, EdgeSource, EdgeSubscription, HwError, Result};
use crate::tracing::prelude::*;

/// How long a poll may block before the thread checks for shutdown.
const POLL_TIMEOUT_MS: u16 = 100;

pub struct SysfsEdgeInput {
    line: u32,
    dir: PathBuf,
}

impl SysfsEdgeInput {
    /// Export (if needed) GPIO `line` and configure it as an input.
    pub fn open(sysfs_root: &Path, line: u32) -> Result<Self> {
        let gpio_root = sysfs_root.join("gpio");
        let dir = gpio_root.join(format!("gpio{line}"));

        if !dir.is_dir() {
            debug!(line, "Exporting GPIO line");
            write_attr(&gpio_root.join("export"), line)?;
            if !dir.is_dir() {
                return Err(HwError::Unsupported(format!(
                    "{} did not appear after export",
                    dir.display()
                )));
            }
        }

        write_attr(&dir.join("direction"), "in")?;
        Ok(Self { line, dir })
    }

    pub fn line(&self) -> u32 {
        self.line
    }
}

impl EdgeSource for SysfsEdgeInput {
    fn subscribe(
        &mut self,
        edge: Edge,
        callback: EdgeCallback,
    ) -> Result<Box<dyn EdgeSubscription>> {
        write_attr(&self.dir.join("edge"), edge)?;

        let mut value = File::open(self.dir.join("value"))?;
        // Consume the current level so the first poll waits for an edge.
        drain_value(&mut value)?;

        let running = Arc::new(AtomicBool::new(true));
        let thread_running = Arc::clone(&running);
        let line = self.line;

        let handle = thread::Builder::new()
            .name(format!("gpio{line}-edges"))
            .spawn(move || watch_edges(line, value, callback, thread_running))?;

        info!(line, edge = %edge, "Listening for GPIO edges");

        Ok(Box::new(SysfsEdgeSubscription {
            running,
            handle: Some(handle),
        }))
    }
}

fn drain_value(file: &mut File) -> std::io::Result<()> {
    let mut buf = [0u8; 8];
    file.seek(SeekFrom::Start(0))?;
    let _ = file.read(&mut buf)?;
    Ok(())
}

fn watch_edges(line: u32, mut value: File, callback: EdgeCallback, running: Arc<AtomicBool>) {
    let wanted = PollFlags::POLLPRI | PollFlags::POLLERR;

    while running.load(Ordering::Acquire) {
        let ready = {
            let mut fds = [PollFd::new(value.as_fd(), wanted)];
            match poll(&mut fds, PollTimeout::from(POLL_TIMEOUT_MS)) {
                Ok(0) => false,
                Ok(_) => fds[0].revents().is_some_and(|r| r.intersects(wanted)),
                Err(Errno::EINTR) => false,
                Err(e) => {
                    error!(line, error = %e, "GPIO poll failed; edge delivery stopped");
                    return;
                }
            }
        };

        if !ready {
            continue;
        }

        callback();

        if let Err(e) = drain_value(&mut value) {
            error!(line, error = %e, "GPIO value read failed; edge delivery stopped");
            return;
        }
    }

    trace!(line, "GPIO edge thread exiting");
}

struct SysfsEdgeSubscription {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SysfsEdgeSubscription {
    fn shutdown(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("GPIO edge thread panicked");
            }
        }
    }
}

impl EdgeSubscription for SysfsEdgeSubscription {
    fn stop(mut self: Box<Self>) {
        self.shutdown();
    }
}

impl Drop for SysfsEdgeSubscription {
    fn drop(&mut self) {
        self.shutdown();
    }
}
