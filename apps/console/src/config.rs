use std::{collections::HashMap, fs};

#[derive(Debug, Clone)]
pub struct Settings {
    pub device_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            // The reference device serves its control API on port 5001.
            device_url: "http://localhost:5001".into(),
        }
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("console.toml") {
        apply_file_config(&mut settings, &raw);
    }

    if let Ok(v) = std::env::var("DEVICE_URL") {
        settings.device_url = v;
    }
    if let Ok(v) = std::env::var("APP__DEVICE_URL") {
        settings.device_url = v;
    }

    settings
}

fn apply_file_config(settings: &mut Settings, raw: &str) {
    if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(raw) {
        if let Some(v) = file_cfg.get("device_url") {
            settings.device_url = v.clone();
        }
    }
}
