use crate::error::LightError;
use crate::light::{LightState, OnCommandType};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Load environment variables from .env file with robust parsing.
/// Handles values with spaces without requiring quotes.
pub fn load_dotenv() {
    let env_path = Path::new(".env");
    if !env_path.exists() {
        return;
    }

    let content = match fs::read_to_string(env_path) {
        Ok(c) => c,
        Err(_) => return,
    };

    for (key, value) in parse_dotenv(&content) {
        // Only set if not already set (env vars take precedence)
        if std::env::var(key).is_err() {
            // SAFETY: We're single-threaded at this point (called before any async runtime)
            unsafe { std::env::set_var(key, value) };
        }
    }
}

fn parse_dotenv(content: &str) -> Vec<(&str, &str)> {
    let mut pairs = Vec::new();

    for line in content.lines() {
        let line = line.trim();

        // Skip empty lines and comments
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        // Find the first '=' and split there
        if let Some(eq_pos) = line.find('=') {
            let key = line[..eq_pos].trim();
            let mut value = line[eq_pos + 1..].trim();

            // Remove surrounding quotes if present
            if value.len() >= 2
                && ((value.starts_with('"') && value.ends_with('"'))
                    || (value.starts_with('\'') && value.ends_with('\'')))
            {
                value = &value[1..value.len() - 1];
            }

            pairs.push((key, value));
        }
    }

    pairs
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub mqtt: MqttConfig,
    pub light: LightConfig,
}

impl Config {
    /// Broker settings from the environment, light definition from a file.
    pub fn load(light_path: impl AsRef<Path>) -> crate::error::Result<Self> {
        Ok(Self {
            mqtt: MqttConfig::from_env(),
            light: LightConfig::from_file(light_path)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    pub broker_host: String,
    pub broker_port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            client_id: "mqtt-light".to_string(),
            username: None,
            password: None,
        }
    }
}

impl MqttConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("MQTT_BROKER_HOST") {
            config.broker_host = host;
        }
        if let Ok(port) = std::env::var("MQTT_BROKER_PORT")
            && let Ok(p) = port.parse()
        {
            config.broker_port = p;
        }
        if let Ok(client_id) = std::env::var("MQTT_CLIENT_ID") {
            config.client_id = client_id;
        }
        if let Ok(username) = std::env::var("MQTT_USERNAME") {
            config.username = Some(username);
        }
        if let Ok(password) = std::env::var("MQTT_PASSWORD") {
            config.password = Some(password);
        }

        config
    }
}

/// Topics, templates and payloads of one MQTT light.
///
/// Every channel is optional except `command_topic`. A channel with a
/// command topic but no state topic is optimistic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightConfig {
    pub name: String,

    pub command_topic: Option<String>,
    pub state_topic: Option<String>,
    pub state_value_template: Option<String>,

    pub brightness_command_topic: Option<String>,
    pub brightness_state_topic: Option<String>,
    pub brightness_value_template: Option<String>,
    pub brightness_scale: u32,

    pub rgb_command_topic: Option<String>,
    pub rgb_state_topic: Option<String>,
    pub rgb_value_template: Option<String>,
    pub rgb_command_template: Option<String>,
    pub rgb_scale: u32,

    pub hs_command_topic: Option<String>,
    pub hs_state_topic: Option<String>,
    pub hs_value_template: Option<String>,

    pub xy_command_topic: Option<String>,
    pub xy_state_topic: Option<String>,
    pub xy_value_template: Option<String>,

    pub color_temp_command_topic: Option<String>,
    pub color_temp_state_topic: Option<String>,
    pub color_temp_value_template: Option<String>,

    pub white_value_command_topic: Option<String>,
    pub white_value_state_topic: Option<String>,
    #[serde(alias = "white_value_value_template")]
    pub white_value_template: Option<String>,
    pub white_value_scale: u32,

    pub effect_command_topic: Option<String>,
    pub effect_state_topic: Option<String>,
    pub effect_value_template: Option<String>,
    pub effect_list: Vec<String>,

    pub payload_on: String,
    pub payload_off: String,

    pub availability_topic: Option<String>,
    pub payload_available: String,
    pub payload_not_available: String,

    pub qos: u8,
    pub optimistic: bool,
    pub on_command_type: OnCommandType,
}

impl Default for LightConfig {
    fn default() -> Self {
        Self {
            name: "MQTT Light".to_string(),
            command_topic: None,
            state_topic: None,
            state_value_template: None,
            brightness_command_topic: None,
            brightness_state_topic: None,
            brightness_value_template: None,
            brightness_scale: 255,
            rgb_command_topic: None,
            rgb_state_topic: None,
            rgb_value_template: None,
            rgb_command_template: None,
            rgb_scale: 255,
            hs_command_topic: None,
            hs_state_topic: None,
            hs_value_template: None,
            xy_command_topic: None,
            xy_state_topic: None,
            xy_value_template: None,
            color_temp_command_topic: None,
            color_temp_state_topic: None,
            color_temp_value_template: None,
            white_value_command_topic: None,
            white_value_state_topic: None,
            white_value_template: None,
            white_value_scale: 255,
            effect_command_topic: None,
            effect_state_topic: None,
            effect_value_template: None,
            effect_list: Vec::new(),
            payload_on: "ON".to_string(),
            payload_off: "OFF".to_string(),
            availability_topic: None,
            payload_available: "online".to_string(),
            payload_not_available: "offline".to_string(),
            qos: 0,
            optimistic: false,
            on_command_type: OnCommandType::Last,
        }
    }
}

impl LightConfig {
    /// Create a config with only the required power command topic set.
    pub fn new(command_topic: impl Into<String>) -> Self {
        Self {
            command_topic: Some(command_topic.into()),
            ..Self::default()
        }
    }

    /// Read a light definition from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> crate::error::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the options a light cannot be created without.
    pub fn validate(&self) -> Result<(), LightError> {
        if self.command_topic.as_deref().is_none_or(str::is_empty) {
            return Err(LightError::Config("command_topic is required".to_string()));
        }
        for (option, scale) in [
            ("brightness_scale", self.brightness_scale),
            ("rgb_scale", self.rgb_scale),
            ("white_value_scale", self.white_value_scale),
        ] {
            if scale == 0 {
                return Err(LightError::Config(format!("{option} must be at least 1")));
            }
        }
        if self.qos > 2 {
            return Err(LightError::Config(format!(
                "qos must be 0, 1 or 2, got {}",
                self.qos
            )));
        }
        if self.payload_on == self.payload_off {
            return Err(LightError::Config(
                "payload_on and payload_off must differ".to_string(),
            ));
        }
        Ok(())
    }
}

/// Read a saved light state. A missing file means nothing to restore.
pub fn load_state(path: impl AsRef<Path>) -> crate::error::Result<Option<LightState>> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&content)?))
}

/// Save a light state snapshot for the next start.
pub fn save_state(path: impl AsRef<Path>, state: &LightState) -> crate::error::Result<()> {
    fs::write(path, serde_json::to_string_pretty(state)?)?;
    Ok(())
}
