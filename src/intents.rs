//! Editor entry points from outside the app: widget taps and shared text.
//!
//! Both triggers leave a pending "open the editor with this text" signal that
//! the UI consumes exactly once through [`EditorIntents::take_pending`].

use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::settings::SettingsRepository;

pub struct EditorIntents {
    settings: Arc<SettingsRepository>,
    pending: Mutex<Option<String>>,
}

impl EditorIntents {
    pub fn new(settings: Arc<SettingsRepository>) -> Self {
        Self {
            settings,
            pending: Mutex::new(None),
        }
    }

    /// A widget or shortcut asked for a new memo, optionally from a template.
    pub fn on_widget_tapped(&self, template: Option<&str>) -> Result<()> {
        self.settings.set_last_used_template(template.unwrap_or(""))?;
        self.set_pending(template.map(str::to_string))
    }

    /// Text shared from another app; blank content is ignored.
    pub fn on_share_received(&self, content: &str) -> Result<()> {
        if content.trim().is_empty() {
            log::debug!("[EditorIntents] Ignoring blank shared content");
            return Ok(());
        }

        let template = self.settings.share_intent_template()?;
        let text = if template.trim().is_empty() {
            content.to_string()
        } else {
            format!("{}{}", content, template)
        };

        self.settings.set_last_used_template(&text)?;
        log::info!("[EditorIntents] Shared content received ({} chars)", text.chars().count());
        self.set_pending(Some(text))
    }

    /// Consume the pending editor text, if any.
    pub fn take_pending(&self) -> Option<String> {
        self.pending.lock().ok().and_then(|mut pending| pending.take())
    }

    fn set_pending(&self, text: Option<String>) -> Result<()> {
        let mut pending = self
            .pending
            .lock()
            .map_err(|_| Error::Other("pending intent lock poisoned".to_string()))?;
        *pending = text;
        Ok(())
    }
}

/// Combine a share's parts into editor text: title line first, then the text.
///
/// The subject wins over the title when both are present. Blank parts are skipped.
pub fn compose_shared_text(text: Option<&str>, subject: Option<&str>, title: Option<&str>) -> String {
    fn present(s: Option<&str>) -> Option<&str> {
        s.filter(|s| !s.trim().is_empty())
    }

    let heading = present(subject).or(present(title));
    let body = present(text);

    let mut combined = String::new();
    if let Some(heading) = heading {
        combined.push_str(heading);
        if body.is_some() {
            combined.push('\n');
        }
    }
    if let Some(body) = body {
        combined.push_str(body);
    }
    combined
}
