use crate::core::realtime::CoachVoice;
use crate::relay::RelayMode;

use super::yaml::{CoachYaml, YamlConfig};
use super::{ConfigError, ServerConfig, TlsConfig, env};

/// Loads the environment, then applies YAML values on top.
pub(super) fn merge_config(yaml: Option<YamlConfig>) -> Result<ServerConfig, ConfigError> {
    let mut config = env::load_from_env()?;
    if let Some(yaml) = yaml {
        apply_yaml(&mut config, yaml)?;
    }
    Ok(config)
}

fn apply_yaml(config: &mut ServerConfig, yaml: YamlConfig) -> Result<(), ConfigError> {
    if let Some(server) = yaml.server {
        if let Some(host) = server.host {
            config.host = host;
        }
        if let Some(port) = server.port {
            config.port = port;
        }
        if let Some(tls) = server.tls {
            config.tls = Some(TlsConfig {
                cert_path: tls.cert_path,
                key_path: tls.key_path,
            });
        }
    }

    if let Some(providers) = yaml.providers
        && let Some(key) = providers.openai_api_key
    {
        config.openai_api_key = Some(key);
    }

    if let Some(relay) = yaml.relay {
        if let Some(mode) = relay.mode {
            config.relay_mode = RelayMode::parse(&mode).ok_or_else(|| ConfigError::InvalidValue {
                key: "relay.mode".to_string(),
                message: format!("{mode:?} is not one of websocket, ephemeral_token"),
            })?;
        }
        if let Some(url) = relay.upstream_realtime_url {
            config.upstream_realtime_url = url;
        }
        if let Some(url) = relay.upstream_sessions_url {
            config.upstream_sessions_url = url;
        }
        if let Some(secs) = relay.connect_timeout_seconds {
            config.upstream_connect_timeout_seconds = secs;
        }
        if let Some(secs) = relay.idle_timeout_seconds {
            config.relay_idle_timeout_seconds = secs;
        }
    }

    if let Some(coach) = yaml.coach {
        apply_coach(config, coach)?;
    }

    if let Some(security) = yaml.security {
        if let Some(origins) = security.cors_allowed_origins {
            config.cors_allowed_origins = Some(origins);
        }
        if let Some(rps) = security.rate_limit_requests_per_second {
            config.rate_limit_requests_per_second = rps;
        }
        if let Some(burst) = security.rate_limit_burst_size {
            config.rate_limit_burst_size = burst;
        }
        if let Some(max) = security.max_websocket_connections {
            config.max_websocket_connections = Some(max);
        }
        if let Some(per_ip) = security.max_connections_per_ip {
            config.max_connections_per_ip = per_ip;
        }
    }

    Ok(())
}

fn apply_coach(config: &mut ServerConfig, coach: CoachYaml) -> Result<(), ConfigError> {
    let settings = &mut config.coach;

    if let Some(model) = coach.model {
        settings.model = model;
    }
    if let Some(voice) = coach.voice {
        settings.voice = CoachVoice::parse(&voice).ok_or_else(|| ConfigError::InvalidValue {
            key: "coach.voice".to_string(),
            message: format!("unknown voice {voice:?}"),
        })?;
    }
    if let Some(instructions) = coach.instructions {
        settings.instructions = instructions;
    }
    if let Some(temperature) = coach.temperature {
        settings.temperature = temperature;
    }
    if let Some(model) = coach.transcription_model {
        settings.transcription_model = model;
    }
    if let Some(greeting) = coach.greeting {
        settings.greeting = Some(greeting);
    }
    if let Some(vad) = coach.vad {
        if let Some(threshold) = vad.threshold {
            settings.vad.threshold = threshold;
        }
        if let Some(padding) = vad.prefix_padding_ms {
            settings.vad.prefix_padding_ms = padding;
        }
        if let Some(silence) = vad.silence_duration_ms {
            settings.vad.silence_duration_ms = silence;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_yaml_overrides_env() {
        unsafe {
            std::env::set_var("PORT", "4000");
            std::env::set_var("OPENAI_API_KEY", "sk-env");
            std::env::set_var("REALTIME_VOICE", "echo");
        }

        let yaml: YamlConfig = serde_yaml::from_str(
            r#"
server:
  port: 5000
providers:
  openai_api_key: "sk-yaml"
coach:
  vad:
    silence_duration_ms: 700
"#,
        )
        .unwrap();

        let config = merge_config(Some(yaml)).unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.openai_api_key.as_deref(), Some("sk-yaml"));
        // Not in YAML, so the environment value stays.
        assert_eq!(config.coach.voice, CoachVoice::Echo);
        assert_eq!(config.coach.vad.silence_duration_ms, 700);
        assert_eq!(config.coach.vad.prefix_padding_ms, 300);

        unsafe {
            std::env::remove_var("PORT");
            std::env::remove_var("OPENAI_API_KEY");
            std::env::remove_var("REALTIME_VOICE");
        }
    }

    #[test]
    #[serial]
    fn test_yaml_bad_mode() {
        let yaml: YamlConfig = serde_yaml::from_str("relay:\n  mode: carrier-pigeon\n").unwrap();
        assert!(matches!(
            merge_config(Some(yaml)),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
