//! Subtitle registry: merged track list, single visible track, offset
//! correction.
//!
//! Cue timings are rewritten from an original-value side table. The first
//! time a cue is seen its `(start, end)` is stored under its [`CueKey`] and
//! never overwritten, so every offset is applied to the undisturbed timing
//! and `set_offset(0.0)` restores the source exactly.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::collaborators::MediaSink;
use crate::error::{Error, Result};
use crate::model::{BlobUrl, TextTrackMode};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cue {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl Cue {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Provenance {
    /// Loaded by the user from a subtitle file.
    External,
    /// Discovered inside the media container.
    Embedded,
}

/// Where the sink finds the track data.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum TrackSource {
    Blob(BlobUrl),
    /// Index in the media element text track list.
    Embedded(usize),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SubtitleTrack {
    pub label: String,
    pub language: String,
    pub source: TrackSource,
    pub offset_seconds: f64,
    pub provenance: Provenance,
    #[serde(skip)]
    instance: u64,
}

impl SubtitleTrack {
    pub fn blob_url(&self) -> Option<&BlobUrl> {
        match &self.source {
            TrackSource::Blob(url) => Some(url),
            TrackSource::Embedded(_) => None,
        }
    }
}

/// Identity of one cue: the track instance that delivered it and its index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct CueKey {
    instance: u64,
    index: usize,
}

/// Outcome of registering a track.
#[derive(Debug, PartialEq)]
pub enum Registration {
    Added,
    /// An existing track with the same label was replaced. Its blob URL, if
    /// any, must be revoked by the caller.
    Replaced(Option<BlobUrl>),
    /// An external track already owns the label.
    Shadowed,
}

#[derive(Debug, Default)]
pub struct SubtitleRegistry {
    tracks: Vec<SubtitleTrack>,
    cues: HashMap<u64, Vec<Cue>>,
    originals: HashMap<CueKey, (f64, f64)>,
    active: Option<String>,
    next_instance: u64,
}

impl SubtitleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tracks(&self) -> &[SubtitleTrack] {
        &self.tracks
    }

    pub fn track(&self, label: &str) -> Option<&SubtitleTrack> {
        self.tracks.iter().find(|t| t.label == label)
    }

    pub fn active(&self) -> Option<&SubtitleTrack> {
        self.active.as_deref().and_then(|label| self.track(label))
    }

    pub fn active_label(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Registers a user-loaded track. Always wins over an existing track with
    /// the same label.
    pub fn add_external(
        &mut self,
        label: &str,
        language: &str,
        url: BlobUrl,
        cues: Vec<Cue>,
        sink: &mut dyn MediaSink,
    ) -> Registration {
        let displaced = self.remove(label);
        let instance = self.insert(
            label,
            language,
            TrackSource::Blob(url.clone()),
            Provenance::External,
        );
        self.record_cues(instance, cues);

        sink.add_text_track(label, language, &url);
        self.apply_visibility(sink);
        debug!(label, language, "External subtitle track registered");

        match displaced {
            Some(old) => Registration::Replaced(old.blob_url().cloned()),
            None => Registration::Added,
        }
    }

    /// Registers a track discovered in the media container. Replaces an older
    /// embedded track of the same label, never an external one.
    pub fn add_embedded(
        &mut self,
        index: usize,
        label: &str,
        language: &str,
        sink: &mut dyn MediaSink,
    ) -> Registration {
        let result = match self.track(label).map(|t| t.provenance) {
            Some(Provenance::External) => {
                trace!(label, "Embedded track shadowed by external track");
                return Registration::Shadowed;
            }
            Some(Provenance::Embedded) => {
                self.remove(label);
                Registration::Replaced(None)
            }
            None => Registration::Added,
        };
        self.insert(label, language, TrackSource::Embedded(index), Provenance::Embedded);
        self.apply_visibility(sink);
        result
    }

    /// Cues of an embedded track as reported by the media element. Cues
    /// arriving for a track with a non-zero offset are shifted immediately.
    pub fn cues_loaded(&mut self, label: &str, cues: Vec<Cue>, sink: &mut dyn MediaSink) {
        let Some(track) = self.track(label) else {
            trace!(label, "Cues for unknown track ignored");
            return;
        };
        if track.provenance == Provenance::External {
            return;
        }
        let instance = track.instance;
        let offset = track.offset_seconds;
        self.record_cues(instance, cues);
        if offset != 0.0 {
            self.rewrite_cues(label, instance, offset, sink);
        }
    }

    /// Shows exactly `label` (or nothing) and hides every other track.
    pub fn set_active(&mut self, label: Option<&str>, sink: &mut dyn MediaSink) -> Result<()> {
        if let Some(label) = label {
            if self.track(label).is_none() {
                return Err(Error::UnknownTrack(label.to_string()));
            }
        }
        self.active = label.map(str::to_string);
        self.apply_visibility(sink);
        debug!(active = ?self.active, "Subtitle selection changed");
        Ok(())
    }

    /// Sets the offset of the active track, rewriting every cue from its
    /// original timing. Negative results are clamped at zero.
    pub fn set_offset(&mut self, seconds: f64, sink: &mut dyn MediaSink) -> Result<()> {
        if !seconds.is_finite() {
            return Err(Error::invalid_command("subtitle offset must be finite"));
        }
        let label = self
            .active
            .clone()
            .ok_or_else(|| Error::invalid_command("no active subtitle track"))?;
        let track = self
            .tracks
            .iter_mut()
            .find(|t| t.label == label)
            .ok_or_else(|| Error::UnknownTrack(label.clone()))?;
        track.offset_seconds = seconds;
        let instance = track.instance;
        self.rewrite_cues(&label, instance, seconds, sink);
        Ok(())
    }

    /// Current (offset-adjusted) cues of a track.
    pub fn cues(&self, label: &str) -> Vec<Cue> {
        let Some(track) = self.track(label) else {
            return Vec::new();
        };
        self.cues
            .get(&track.instance)
            .map(|cues| {
                cues.iter()
                    .enumerate()
                    .map(|(index, cue)| {
                        let key = CueKey {
                            instance: track.instance,
                            index,
                        };
                        let (start, end) = self
                            .originals
                            .get(&key)
                            .copied()
                            .unwrap_or((cue.start, cue.end));
                        let (start, end) = shift(start, end, track.offset_seconds);
                        Cue::new(start, end, cue.text.clone())
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Registers every external track again after the sink loaded a new
    /// source.
    pub fn reattach(&self, sink: &mut dyn MediaSink) {
        for track in &self.tracks {
            if let TrackSource::Blob(url) = &track.source {
                sink.add_text_track(&track.label, &track.language, url);
                if track.offset_seconds != 0.0 {
                    self.push_timings(&track.label, track.instance, track.offset_seconds, sink);
                }
            }
        }
        self.apply_visibility(sink);
    }

    /// Forgets embedded tracks; they belong to the media that was unloaded.
    pub fn drop_embedded(&mut self) {
        let embedded: Vec<u64> = self
            .tracks
            .iter()
            .filter(|t| t.provenance == Provenance::Embedded)
            .map(|t| t.instance)
            .collect();
        for instance in embedded {
            self.forget(instance);
        }
        self.tracks.retain(|t| t.provenance == Provenance::External);
        if self.active().is_none() {
            self.active = None;
        }
    }

    /// Empties the registry and returns every blob URL it owned.
    pub fn clear(&mut self) -> Vec<BlobUrl> {
        let urls = self
            .tracks
            .iter()
            .filter_map(|t| t.blob_url().cloned())
            .collect();
        self.tracks.clear();
        self.cues.clear();
        self.originals.clear();
        self.active = None;
        urls
    }

    fn insert(
        &mut self,
        label: &str,
        language: &str,
        source: TrackSource,
        provenance: Provenance,
    ) -> u64 {
        let instance = self.next_instance;
        self.next_instance += 1;
        self.tracks.push(SubtitleTrack {
            label: label.to_string(),
            language: language.to_string(),
            source,
            offset_seconds: 0.0,
            provenance,
            instance,
        });
        instance
    }

    fn remove(&mut self, label: &str) -> Option<SubtitleTrack> {
        let pos = self.tracks.iter().position(|t| t.label == label)?;
        let track = self.tracks.remove(pos);
        self.forget(track.instance);
        Some(track)
    }

    fn forget(&mut self, instance: u64) {
        self.cues.remove(&instance);
        self.originals.retain(|key, _| key.instance != instance);
    }

    fn record_cues(&mut self, instance: u64, cues: Vec<Cue>) {
        for (index, cue) in cues.iter().enumerate() {
            self.originals
                .entry(CueKey { instance, index })
                .or_insert((cue.start, cue.end));
        }
        self.cues.insert(instance, cues);
    }

    fn rewrite_cues(&mut self, label: &str, instance: u64, offset: f64, sink: &mut dyn MediaSink) {
        if let Some(cues) = self.cues.get(&instance) {
            for (index, cue) in cues.iter().enumerate() {
                self.originals
                    .entry(CueKey { instance, index })
                    .or_insert((cue.start, cue.end));
            }
        }
        self.push_timings(label, instance, offset, sink);
        debug!(label, offset, "Subtitle cues rewritten");
    }

    fn push_timings(&self, label: &str, instance: u64, offset: f64, sink: &mut dyn MediaSink) {
        let count = self.cues.get(&instance).map(Vec::len).unwrap_or(0);
        for index in 0..count {
            if let Some((start, end)) = self.originals.get(&CueKey { instance, index }) {
                let (start, end) = shift(*start, *end, offset);
                sink.set_cue_timing(label, index, start, end);
            }
        }
    }

    fn apply_visibility(&self, sink: &mut dyn MediaSink) {
        // Hide first so two tracks are never shown together.
        for track in &self.tracks {
            if self.active.as_deref() != Some(track.label.as_str()) {
                sink.set_text_track_mode(&track.label, TextTrackMode::Hidden);
            }
        }
        if let Some(active) = self.active() {
            sink.set_text_track_mode(&active.label, TextTrackMode::Showing);
        }
    }
}

fn shift(start: f64, end: f64, offset: f64) -> (f64, f64) {
    ((start + offset).max(0.0), (end + offset).max(0.0))
}

/// Parses SubRip or WebVTT text into cues.
pub fn parse_subtitle_text(text: &str) -> Result<Vec<Cue>> {
    let text = text.trim_start_matches('\u{feff}').replace("\r\n", "\n");
    let mut cues = Vec::new();

    for block in text.split("\n\n") {
        let mut lines = block.lines().skip_while(|l| l.trim().is_empty());
        let mut timing = None;
        for line in lines.by_ref() {
            if line.contains("-->") {
                timing = Some(line);
                break;
            }
        }
        let Some(timing) = timing else {
            continue;
        };
        let (start, end) = parse_timing_line(timing)?;
        let body: Vec<&str> = lines.collect();
        cues.push(Cue::new(start, end, body.join("\n")));
    }

    if cues.is_empty() {
        return Err(Error::format("no subtitle cues found"));
    }
    Ok(cues)
}

fn parse_timing_line(line: &str) -> Result<(f64, f64)> {
    let (left, right) = line
        .split_once("-->")
        .ok_or_else(|| Error::format(format!("bad timing line: {line}")))?;
    // WebVTT allows cue settings after the end timestamp.
    let right = right.split_whitespace().next().unwrap_or("");
    Ok((parse_timestamp(left.trim())?, parse_timestamp(right)?))
}

fn parse_timestamp(stamp: &str) -> Result<f64> {
    let bad = || Error::format(format!("bad timestamp: {stamp}"));
    let normalized = stamp.replace(',', ".");
    let (clock, millis) = normalized.split_once('.').unwrap_or((&normalized, "0"));
    let parts: Vec<&str> = clock.split(':').collect();
    let (h, m, s) = match parts.as_slice() {
        [h, m, s] => (*h, *m, *s),
        [m, s] => ("0", *m, *s),
        _ => return Err(bad()),
    };
    let h: u64 = h.parse().map_err(|_| bad())?;
    let m: u64 = m.parse().map_err(|_| bad())?;
    let s: u64 = s.parse().map_err(|_| bad())?;
    let ms: f64 = format!("0.{millis}").parse().map_err(|_| bad())?;
    let seconds = h
        .checked_mul(3600)
        .and_then(|h| m.checked_mul(60).and_then(|m| h.checked_add(m)))
        .and_then(|hm| hm.checked_add(s))
        .ok_or_else(bad)?;
    Ok(seconds as f64 + ms)
}

/// Serialises cues as a WebVTT document.
pub fn to_webvtt(cues: &[Cue]) -> String {
    let mut out = String::from("WEBVTT\n\n");
    for cue in cues {
        out.push_str(&format_timestamp(cue.start));
        out.push_str(" --> ");
        out.push_str(&format_timestamp(cue.end));
        out.push('\n');
        out.push_str(&cue.text);
        out.push_str("\n\n");
    }
    out
}

fn format_timestamp(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let (h, rest) = (total_ms / 3_600_000, total_ms % 3_600_000);
    let (m, rest) = (rest / 60_000, rest % 60_000);
    let (s, ms) = (rest / 1000, rest % 1000);
    format!("{h:02}:{m:02}:{s:02}.{ms:03}")
}
