//! Deferred deallocation for decoded audio
//!
//! A decoded track is held twice per deck (forward and reversed) and can run
//! to hundreds of megabytes. Replacing or unloading it happens on the audio
//! thread, where freeing that much memory would stall the callback.
//!
//! Track buffers are therefore wrapped in `basedrop::Shared<T>`. Dropping the
//! last reference only enqueues the pointer; a background "audio-gc" thread
//! performs the actual free.
//!
//! ```ignore
//! use basedrop::Shared;
//! use crate::engine::gc::gc_handle;
//!
//! let forward = Shared::new(&gc_handle(), buffer);
//! drop(forward); // queued, freed later on the GC thread
//! ```

use basedrop::{Collector, Handle};
use std::sync::mpsc;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

/// How often the GC thread reclaims queued allocations
const COLLECT_INTERVAL: Duration = Duration::from_millis(100);

static GC_HANDLE: OnceLock<Handle> = OnceLock::new();

fn init_gc() -> Handle {
    let (tx, rx) = mpsc::channel();

    let spawned = thread::Builder::new()
        .name("audio-gc".to_string())
        .spawn(move || {
            // Collector is !Sync, so it lives on this thread only
            let mut collector = Collector::new();
            if tx.send(collector.handle()).is_err() {
                return;
            }

            log::info!("Audio GC thread started");
            loop {
                collector.collect();
                thread::sleep(COLLECT_INTERVAL);
            }
        });

    let received = match spawned {
        Ok(_) => rx.recv().ok(),
        Err(e) => {
            log::error!("Failed to spawn audio GC thread: {}", e);
            None
        }
    };

    received.unwrap_or_else(|| {
        // Without a collector thread, queued drops are never reclaimed.
        // Playback keeps working; replaced tracks leak instead.
        log::warn!("Audio GC unavailable, track memory will not be reclaimed");
        Box::leak(Box::new(Collector::new())).handle()
    })
}

/// Handle for creating `Shared<T>` allocations
///
/// The first call starts the GC thread. Handles are cheap to clone.
pub fn gc_handle() -> Handle {
    GC_HANDLE.get_or_init(init_gc).clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use basedrop::Shared;

    #[test]
    fn test_shared_drop_is_deferred_safely() {
        let data = Shared::new(&gc_handle(), vec![0.5f32; 1024]);
        let clone = data.clone();
        assert_eq!(clone.len(), 1024);
        drop(data);
        assert_eq!(clone[0], 0.5);
        drop(clone);
    }
}
