//! Integration tests for GC tracing feature.
//!
//! These tests verify that tracing spans and events are emitted during
//! collections and allocation failures.

#![cfg(feature = "tracing")]

use std::io;
use std::sync::{Arc, Mutex};

use conserve_gc::{Collector, GcConfig, Malloc, RootBounds};
use tracing_subscriber::fmt::MakeWriter;

/// Collects formatted output into a shared buffer.
#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for Captured {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn capture<F: FnOnce()>(f: F) -> String {
    let captured = Captured::default();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_writer(captured.clone())
        .with_ansi(false)
        .finish();
    tracing::subscriber::with_default(subscriber, f);
    captured.contents()
}

fn isolated() -> Collector {
    Collector::with_config(Malloc, GcConfig::default().roots(RootBounds::none()))
}

#[test]
fn test_collection_emits_phase_events() {
    let output = capture(|| {
        let mut gc = isolated();
        gc.allocate(32).unwrap();
        gc.collect();
    });

    assert!(output.contains("gc_collect"));
    assert!(output.contains("trigger=\"explicit\""));
    assert!(output.contains("phase_start"));
    assert!(output.contains("phase_end"));
    assert!(output.contains("bytes_reclaimed=32"));
}

#[test]
fn test_registered_roots_are_logged() {
    let output = capture(|| {
        let mut gc = isolated();
        let roots = [0usize; 4];
        unsafe { gc.register_root_region(roots.as_ptr().cast(), 32) };
        gc.collect();
    });

    assert!(output.contains("root_region"));
    assert!(output.contains("kind=\"registered\""));
}

#[test]
fn test_out_of_memory_is_logged() {
    let output = capture(|| {
        let mut gc = Collector::with_config(
            Malloc,
            GcConfig::default()
                .roots(RootBounds::none())
                .heap_limit(Some(8)),
        );
        assert!(gc.allocate(16).is_err());
    });

    assert!(output.contains("trigger=\"exhausted\""));
    assert!(output.contains("out_of_memory"));
    assert!(output.contains("requested=16"));
}
