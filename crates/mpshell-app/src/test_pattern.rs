use std::fs::OpenOptions;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, bail};
use memmap2::MmapMut;

use crate::protocol::client::VoClient;
use crate::renderer::types::{AspectConfig, AspectMode, DisplaySize};

const FRAME_INTERVAL: Duration = Duration::from_millis(33);

/// BGRA colour bars: white, yellow, cyan, green, magenta, red, blue, black.
const BARS: [[u8; 4]; 8] = [
    [235, 235, 235, 255],
    [16, 235, 235, 255],
    [235, 235, 16, 255],
    [16, 235, 16, 255],
    [235, 16, 235, 255],
    [16, 16, 235, 255],
    [235, 16, 16, 255],
    [16, 16, 16, 255],
];

/// In-process stand-in for a decoder: scrolls colour bars through the protocol.
pub struct TestPattern {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl TestPattern {
    pub fn start(
        addr: SocketAddr,
        segment: PathBuf,
        size: DisplaySize,
        aspect: AspectConfig,
    ) -> anyhow::Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = shutdown.clone();
        let handle = thread::Builder::new()
            .name("mpshell-test-pattern".into())
            .spawn(move || {
                if let Err(e) = run(addr, &segment, size, aspect, &flag) {
                    log::error!("Test pattern stopped: {e:#}");
                }
                let _ = std::fs::remove_file(&segment);
            })?;
        log::info!("Test pattern {size} feeding {addr}");
        Ok(Self {
            shutdown,
            handle: Some(handle),
        })
    }

    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for TestPattern {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(
    addr: SocketAddr,
    segment: &Path,
    size: DisplaySize,
    aspect: AspectConfig,
    shutdown: &AtomicBool,
) -> anyhow::Result<()> {
    let mut map = create_segment(segment, frame_len(size))?;
    let mut client = VoClient::connect(addr).context("connecting to video output")?;

    let width = i32::try_from(size.width)?;
    let height = i32::try_from(size.height)?;
    let ratio = match aspect.mode {
        AspectMode::Pixel => 1.0,
        AspectMode::Display => size.aspect(),
    };
    let status = client.start(width, height, 4, aspect.encode(ratio))?;
    if status != 0 {
        bail!("start rejected with status {status}");
    }

    let mut phase = 0u32;
    while !shutdown.load(Ordering::Relaxed) {
        let tick = Instant::now();
        fill_bars(&mut map, size, phase);
        client.render()?;
        phase = phase.wrapping_add(4);
        if let Some(rest) = FRAME_INTERVAL.checked_sub(tick.elapsed()) {
            thread::sleep(rest);
        }
    }

    client.stop()?;
    Ok(())
}

fn frame_len(size: DisplaySize) -> usize {
    size.width as usize * size.height as usize * 4
}

fn create_segment(path: &Path, len: usize) -> anyhow::Result<MmapMut> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .with_context(|| format!("creating segment {}", path.display()))?;
    file.set_len(len as u64)?;
    // SAFETY: the segment was just created and truncated by this thread; the
    // shell only reads it, and only between our `render` calls.
    let map = unsafe { MmapMut::map_mut(&file) }?;
    Ok(map)
}

/// Paint vertical bars into a BGRA frame, shifted left by `phase` pixels.
pub fn fill_bars(frame: &mut [u8], size: DisplaySize, phase: u32) {
    let width = size.width as usize;
    let bar_width = width.div_ceil(BARS.len()).max(1);
    let shift = phase as usize % width.max(1);
    let Some(first_row) = frame.get_mut(..width * 4) else {
        return;
    };
    for (x, px) in first_row.chunks_exact_mut(4).enumerate() {
        let bar = ((x + shift) % width) / bar_width;
        px.copy_from_slice(&BARS[bar.min(BARS.len() - 1)]);
    }
    let (row, rest) = frame.split_at_mut(width * 4);
    for dst in rest.chunks_exact_mut(width * 4) {
        dst.copy_from_slice(row);
    }
}
