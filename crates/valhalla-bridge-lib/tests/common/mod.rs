//! Shared fakes for integration tests.
//!
//! Nothing here touches the network or runs real engine tools: release
//! archives are built in memory and engine commands return canned output.

#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::{Arc, Mutex};

use flate2::write::GzEncoder;
use flate2::Compression;
use tar::{Builder, Header};
use valhalla_bridge_lib::{
    ArchiveSource, CommandOutput, CommandRunner, EngineCommand, EngineConfig, Error, Platform,
    ProgressSink, Result,
};

pub const ENGINE_VERSION: &str = "3.5.1";

/// Linux engine config rooted at `cache_root`, independent of the host OS.
pub fn linux_config(cache_root: &Path) -> EngineConfig {
    EngineConfig::new(cache_root)
        .with_platform(Platform::Linux)
        .with_engine_version(ENGINE_VERSION)
        .with_release_base("https://releases.test/valhalla-static")
}

/// A gzip-compressed tar archive holding `entries` as regular files.
pub fn tar_gz(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (path, contents) in entries {
        let mut header = Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        builder
            .append_data(&mut header, path, *contents)
            .expect("append archive entry");
    }
    builder
        .into_inner()
        .expect("finish tar stream")
        .finish()
        .expect("finish gzip stream")
}

/// Archive shaped like a Linux engine release.
pub fn engine_release_archive() -> Vec<u8> {
    tar_gz(&[
        ("bin/valhalla_service", b"#!/bin/sh\n".as_slice()),
        ("bin/valhalla_build_config", b"#!/bin/sh\n".as_slice()),
        ("bin/valhalla_build_tiles", b"#!/bin/sh\n".as_slice()),
        ("lib/libvalhalla.so", b"\x7fELF".as_slice()),
    ])
}

/// Serves a fixed archive and remembers which URLs were requested.
#[derive(Clone)]
pub struct FakeArchiveSource {
    archive: Vec<u8>,
    pub requested: Arc<Mutex<Vec<String>>>,
}

impl FakeArchiveSource {
    pub fn new(archive: Vec<u8>) -> Self {
        Self {
            archive,
            requested: Arc::default(),
        }
    }

    pub fn requested_urls(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

impl ArchiveSource for FakeArchiveSource {
    fn open(&self, url: &str) -> Result<Box<dyn Read + Send>> {
        self.requested.lock().unwrap().push(url.to_string());
        Ok(Box::new(Cursor::new(self.archive.clone())))
    }
}

/// Answers every request like a release server returning 404.
pub struct MissingReleaseSource;

impl ArchiveSource for MissingReleaseSource {
    fn open(&self, url: &str) -> Result<Box<dyn Read + Send>> {
        Err(Error::ReleaseDownload {
            url: url.to_string(),
            status: 404,
            body: "Not Found".to_string(),
        })
    }
}

/// Records engine invocations and answers them with canned output keyed by
/// tool name. Unconfigured tools succeed with empty stdout.
#[derive(Default)]
pub struct FakeCommandRunner {
    replies: Mutex<HashMap<String, CommandOutput>>,
    calls: Mutex<Vec<EngineCommand>>,
}

impl FakeCommandRunner {
    /// Runner whose config and timezone tools produce plausible output.
    pub fn new() -> Self {
        let runner = Self::default();
        runner.reply("valhalla_build_config", success(br#"{"mjolnir":{"tile_dir":"tiles"}}"#));
        runner.reply("valhalla_build_timezones", success(b"SQLite format 3\0"));
        runner
    }

    pub fn reply(&self, tool: &str, output: CommandOutput) {
        self.replies
            .lock()
            .unwrap()
            .insert(tool.to_string(), output);
    }

    pub fn calls(&self) -> Vec<EngineCommand> {
        self.calls.lock().unwrap().clone()
    }

    pub fn tools(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(EngineCommand::tool_name)
            .collect()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }
}

impl CommandRunner for FakeCommandRunner {
    fn run(&self, command: &EngineCommand) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(command.clone());

        let tool = command.tool_name();
        if tool == "valhalla_build_extract" {
            if let Some(dir) = &command.current_dir {
                fs::write(dir.join("valhalla_tiles.tar"), b"tiles")?;
            }
        }

        Ok(self
            .replies
            .lock()
            .unwrap()
            .get(&tool)
            .cloned()
            .unwrap_or_else(|| success(b"")))
    }
}

pub fn success(stdout: &[u8]) -> CommandOutput {
    CommandOutput {
        exit_code: Some(0),
        stdout: stdout.to_vec(),
        stderr_tail: String::new(),
    }
}

pub fn failure(code: i32, stdout: &[u8], stderr: &str) -> CommandOutput {
    CommandOutput {
        exit_code: Some(code),
        stdout: stdout.to_vec(),
        stderr_tail: stderr.to_string(),
    }
}

/// Records task names and counts work units.
#[derive(Default)]
pub struct RecordingProgress {
    pub tasks: Mutex<Vec<String>>,
    pub units: Mutex<u64>,
}

impl RecordingProgress {
    pub fn tasks(&self) -> Vec<String> {
        self.tasks.lock().unwrap().clone()
    }

    pub fn units(&self) -> u64 {
        *self.units.lock().unwrap()
    }
}

impl ProgressSink for RecordingProgress {
    fn task(&self, name: &str, _total: Option<u64>) {
        self.tasks.lock().unwrap().push(name.to_string());
    }

    fn worked(&self, _item: &str, units: u64) {
        *self.units.lock().unwrap() += units;
    }
}

/// A one-leg reply with a three point shape and one maneuver over it.
pub const ONE_LEG_REPLY: &str = r#"{
  "trip": {
    "locations": [
      {"type": "break", "lat": 39.1, "lon": -77.2, "original_index": 0},
      {"type": "break", "lat": 39.2, "lon": -77.3, "side_of_street": "right", "original_index": 1}
    ],
    "legs": [
      {
        "maneuvers": [
          {
            "type": 1,
            "instruction": "Drive north.",
            "verbal_succinct_transition_instruction": "Drive north.",
            "verbal_pre_transition_instruction": "Drive north.",
            "verbal_post_transition_instruction": "Continue for 1 mile.",
            "time": 60.5,
            "length": 1.0,
            "cost": 75.2,
            "begin_shape_index": 0,
            "end_shape_index": 2,
            "travel_mode": "drive",
            "travel_type": "car"
          }
        ],
        "summary": {
          "has_time_restrictions": false, "has_toll": true, "has_highway": false, "has_ferry": false,
          "min_lat": 38.5, "min_lon": -126.453, "max_lat": 43.252, "max_lon": -120.2,
          "time": 60.5, "length": 1.0, "cost": 75.2
        },
        "shape": "_izlhA~rlgdF_{geC~ywl@_kwzCn`{nI"
      }
    ],
    "summary": {
      "has_toll": true,
      "min_lat": 38.5, "min_lon": -126.453, "max_lat": 43.252, "max_lon": -120.2,
      "time": 60.5, "length": 1.0, "cost": 75.2
    },
    "status_message": "Found route between points",
    "status": 0,
    "units": "miles"
  },
  "status_code": 200
}"#;
