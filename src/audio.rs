//! Audio components and the device they talk to.
//!
//! Playback itself is an external collaborator; the engine only needs the narrow
//! [`AudioDevice`] interface.

use std::collections::HashSet;

use glam::Vec3;
use log::warn;

use crate::component::UpdateContext;
use crate::error::{ArchiveError, AudioError};
use crate::persistence::{ArchiveReader, ArchiveWriter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceId(pub u32);

pub trait AudioDevice {
    fn play(&mut self, clip: &str, looped: bool, volume: f32) -> Result<VoiceId, AudioError>;
    fn stop(&mut self, voice: VoiceId);
    fn set_voice_position(&mut self, voice: VoiceId, position: Vec3);
    fn set_listener(&mut self, position: Vec3, forward: Vec3, up: Vec3);
}

/// Silent device. Remembers what was played so headless runs and tests can inspect it.
#[derive(Debug, Default)]
pub struct NullAudio {
    known_clips: Option<HashSet<String>>,
    played: Vec<String>,
    next_voice: u32,
    listener: Option<Vec3>,
}

impl NullAudio {
    /// Accepts every clip.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts only the listed clips; anything else reports [`AudioError::ClipNotFound`].
    pub fn with_clips<I, S>(clips: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known_clips: Some(clips.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn played(&self) -> &[String] {
        &self.played
    }

    pub fn listener(&self) -> Option<Vec3> {
        self.listener
    }
}

impl AudioDevice for NullAudio {
    fn play(&mut self, clip: &str, _looped: bool, _volume: f32) -> Result<VoiceId, AudioError> {
        if let Some(known) = &self.known_clips {
            if !known.contains(clip) {
                return Err(AudioError::ClipNotFound(clip.to_string()));
            }
        }
        self.played.push(clip.to_string());
        self.next_voice += 1;
        Ok(VoiceId(self.next_voice))
    }

    fn stop(&mut self, _voice: VoiceId) {}

    fn set_voice_position(&mut self, _voice: VoiceId, _position: Vec3) {}

    fn set_listener(&mut self, position: Vec3, _forward: Vec3, _up: Vec3) {
        self.listener = Some(position);
    }
}

/// Plays one clip positioned at its owner.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSource {
    pub clip: String,
    pub looped: bool,
    pub volume: f32,
    voice: Option<VoiceId>,
    failed: bool,
}

impl Default for AudioSource {
    fn default() -> Self {
        Self::new("")
    }
}

impl AudioSource {
    pub fn new(clip: impl Into<String>) -> Self {
        Self {
            clip: clip.into(),
            looped: false,
            volume: 1.0,
            voice: None,
            failed: false,
        }
    }

    pub fn voice(&self) -> Option<VoiceId> {
        self.voice
    }

    /// True once the clip failed to start; the source stays quiet afterwards.
    pub fn has_failed(&self) -> bool {
        self.failed
    }

    pub(crate) fn update(&mut self, ctx: &mut UpdateContext<'_>) {
        if self.clip.is_empty() || self.failed {
            return;
        }
        let voice = match self.voice {
            Some(voice) => voice,
            None => match ctx.audio.play(&self.clip, self.looped, self.volume) {
                Ok(voice) => {
                    self.voice = Some(voice);
                    voice
                }
                Err(err) => {
                    warn!("{} cannot play audio: {err}", ctx.owner_name);
                    self.failed = true;
                    return;
                }
            },
        };
        ctx.audio.set_voice_position(voice, ctx.transform.position);
    }

    pub(crate) fn save(&self, writer: &mut dyn ArchiveWriter) {
        writer.write_str("clip", &self.clip);
        writer.write_bool("looped", self.looped);
        writer.write_f32("volume", self.volume);
    }

    pub(crate) fn load(reader: &mut dyn ArchiveReader) -> Result<Self, ArchiveError> {
        let mut source = Self::new(reader.read_str("clip")?);
        source.looped = reader.read_bool("looped")?;
        source.volume = reader.read_f32("volume")?;
        Ok(source)
    }
}

/// Forwards its owner's pose to the device every frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AudioListener;

impl AudioListener {
    pub(crate) fn update(&mut self, ctx: &mut UpdateContext<'_>) {
        let transform = &*ctx.transform;
        ctx.audio
            .set_listener(transform.position, transform.forward(), transform.up());
    }
}
