use std::fmt;
use std::path::Path;

use log::warn;

use crate::error::{ArchiveError, ResourceError};
use crate::persistence::{ArchiveReader, ArchiveWriter};
use crate::scripting::ScriptHost;
use crate::transform::Transform;

use super::UpdateContext;

/// Lua behaviour. The interpreter is created on the first update and again after a reload.
///
/// A load or call failure is kept in [`ScriptComponent::error`] and the script stays idle
/// until its source is reloaded.
#[derive(Default)]
pub struct ScriptComponent {
    name: String,
    source: String,
    pub error: Option<String>,
    host: Option<ScriptHost>,
}

impl fmt::Debug for ScriptComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptComponent")
            .field("name", &self.name)
            .field("error", &self.error)
            .field("loaded", &self.host.is_some())
            .finish()
    }
}

impl ScriptComponent {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            ..Self::default()
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ResourceError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|err| ResourceError::Load {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;
        Ok(Self::new(path.display().to_string(), source))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_loaded(&self) -> bool {
        self.host.is_some()
    }

    pub fn set_source(&mut self, source: impl Into<String>) {
        self.source = source.into();
        self.reload();
    }

    /// Drops the interpreter so the next update starts from a fresh state.
    pub fn reload(&mut self) {
        self.host = None;
        self.error = None;
    }

    pub(crate) fn update(&mut self, ctx: &mut UpdateContext<'_>) {
        if self.error.is_some() || self.source.is_empty() {
            return;
        }
        if self.host.is_none() {
            match ScriptHost::new(
                &self.name,
                &self.source,
                ctx.owner,
                ctx.owner_name,
                ctx.input,
                ctx.bridge,
            ) {
                Ok(host) => self.host = Some(host),
                Err(err) => return self.fail(ctx.owner_name, err),
            }
        }
        if let Some(host) = &self.host {
            if let Err(err) = host.update(ctx.delta_time, ctx.transform) {
                self.fail(ctx.owner_name, err);
            }
        }
    }

    /// Runs a collision hook such as `OnEnter` if the script is loaded and healthy.
    pub(crate) fn notify(&mut self, hook: &str, owner_name: &str, other: &str, transform: &mut Transform) {
        if self.error.is_some() {
            return;
        }
        let Some(host) = &self.host else {
            return;
        };
        if let Err(err) = host.notify(hook, other, transform) {
            self.fail(owner_name, err);
        }
    }

    fn fail(&mut self, owner_name: &str, err: mlua::Error) {
        warn!("script {} on {owner_name} failed: {err}", self.name);
        self.error = Some(err.to_string());
        self.host = None;
    }

    pub(crate) fn save(&self, writer: &mut dyn ArchiveWriter) {
        writer.write_str("name", &self.name);
        writer.write_str("source", &self.source);
    }

    pub(crate) fn load(reader: &mut dyn ArchiveReader) -> Result<Self, ArchiveError> {
        let name = reader.read_str("name")?;
        Ok(Self::new(name, reader.read_str("source")?))
    }
}
