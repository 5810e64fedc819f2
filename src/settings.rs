//! Key-value app settings and per-widget settings, persisted as JSON files.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::tree::local::atomic_write_file;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Granted memo vault root; `None` until the user picks one
    pub root_tree_location: Option<String>,
    pub last_used_template: String,
    /// Appended to shared text when not blank
    pub share_intent_template: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WidgetSetting {
    pub template_name: Option<String>,
    pub template_text: Option<String>,
    pub icon_id: Option<i64>,
}

fn load_json<T: for<'de> Deserialize<'de> + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Ok(T::default());
    }
    let content = fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(T::default());
    }
    Ok(serde_json::from_str(&content)?)
}

fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(value)?;
    atomic_write_file(path, content.as_bytes())
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| Error::Other("settings lock poisoned".to_string()))
}

pub struct SettingsRepository {
    path: PathBuf,
    state: Mutex<AppSettings>,
}

impl SettingsRepository {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = load_json(&path)?;
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn snapshot(&self) -> Result<AppSettings> {
        Ok(lock(&self.state)?.clone())
    }

    pub fn root_tree_location(&self) -> Result<Option<String>> {
        Ok(lock(&self.state)?.root_tree_location.clone())
    }

    pub fn set_root_tree_location(&self, root: Option<String>) -> Result<()> {
        self.update(|s| s.root_tree_location = root)
    }

    pub fn last_used_template(&self) -> Result<String> {
        Ok(lock(&self.state)?.last_used_template.clone())
    }

    pub fn set_last_used_template(&self, template: &str) -> Result<()> {
        self.update(|s| s.last_used_template = template.to_string())
    }

    pub fn share_intent_template(&self) -> Result<String> {
        Ok(lock(&self.state)?.share_intent_template.clone())
    }

    pub fn set_share_intent_template(&self, template: &str) -> Result<()> {
        self.update(|s| s.share_intent_template = template.to_string())
    }

    /// Apply `change` and persist; the in-memory copy only changes if the write succeeds.
    fn update(&self, change: impl FnOnce(&mut AppSettings)) -> Result<()> {
        let mut state = lock(&self.state)?;
        let mut next = state.clone();
        change(&mut next);
        save_json(&self.path, &next)?;
        *state = next;
        Ok(())
    }
}

pub struct WidgetSettingRepository {
    path: PathBuf,
    widgets: Mutex<BTreeMap<i64, WidgetSetting>>,
}

impl WidgetSettingRepository {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let widgets = load_json(&path)?;
        Ok(Self {
            path,
            widgets: Mutex::new(widgets),
        })
    }

    /// Settings for `widget_id`, defaults when never saved.
    pub fn get(&self, widget_id: i64) -> Result<WidgetSetting> {
        Ok(lock(&self.widgets)?.get(&widget_id).cloned().unwrap_or_default())
    }

    pub fn save(&self, widget_id: i64, setting: WidgetSetting) -> Result<()> {
        let mut widgets = lock(&self.widgets)?;
        let mut next = widgets.clone();
        next.insert(widget_id, setting);
        save_json(&self.path, &next)?;
        *widgets = next;
        Ok(())
    }

    pub fn remove(&self, widget_id: i64) -> Result<()> {
        let mut widgets = lock(&self.widgets)?;
        if widgets.contains_key(&widget_id) {
            let mut next = widgets.clone();
            next.remove(&widget_id);
            save_json(&self.path, &next)?;
            *widgets = next;
        }
        Ok(())
    }
}
