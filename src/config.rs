use anyhow::Result;
use std::time::Duration;

/// Configuración del bot, cargada desde variables de entorno.
#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Reproducción
    pub default_volume: u16, // Porcentaje 0-200
    pub max_queue_size: usize,

    // Tiempos
    pub idle_timeout: Duration,          // Cola agotada
    pub empty_channel_timeout: Duration, // Canal de voz sin usuarios
    pub play_start_timeout: Duration,    // Confirmación de reproducción
    pub retry_delay: Duration,           // Reintento tras fallo de un track
    pub join_timeout: Duration,          // Conexión al canal de voz
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            // Reproducción
            default_volume: std::env::var("DEFAULT_VOLUME")
                .unwrap_or_else(|_| "50".to_string())
                .parse()?,
            max_queue_size: std::env::var("MAX_QUEUE_SIZE")
                .unwrap_or_else(|_| "100".to_string())
                .parse()?,

            // Tiempos
            idle_timeout: Duration::from_secs(
                std::env::var("IDLE_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "300".to_string())
                    .parse()?,
            ),
            empty_channel_timeout: Duration::from_secs(
                std::env::var("EMPTY_CHANNEL_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "120".to_string())
                    .parse()?,
            ),
            play_start_timeout: Duration::from_secs(
                std::env::var("PLAY_START_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "15".to_string())
                    .parse()?,
            ),
            retry_delay: Duration::from_millis(
                std::env::var("RETRY_DELAY_MS")
                    .unwrap_or_else(|_| "500".to_string())
                    .parse()?,
            ),
            join_timeout: Duration::from_secs(
                std::env::var("JOIN_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "20".to_string())
                    .parse()?,
            ),
        };

        config.validate()?;

        Ok(config)
    }

    /// Chequeos de sanidad sobre los valores cargados.
    pub fn validate(&self) -> Result<()> {
        if self.default_volume > 200 {
            anyhow::bail!(
                "El volumen por defecto debe estar entre 0 y 200, se recibió: {}",
                self.default_volume
            );
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("El tamaño máximo de la cola debe ser mayor a 0");
        }

        if self.play_start_timeout.is_zero() {
            anyhow::bail!("El timeout de confirmación de reproducción debe ser mayor a 0");
        }

        if self.idle_timeout.is_zero() || self.empty_channel_timeout.is_zero() {
            anyhow::bail!("Los timeouts de inactividad deben ser mayores a 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (sin defaults, deben proveerse)
            discord_token: String::new(),
            guild_id: None,

            // Reproducción
            default_volume: 50,
            max_queue_size: 100,

            // Tiempos
            idle_timeout: Duration::from_secs(300),        // 5 minutos
            empty_channel_timeout: Duration::from_secs(120), // 2 minutos
            play_start_timeout: Duration::from_secs(15),
            retry_delay: Duration::from_millis(500),
            join_timeout: Duration::from_secs(20),
        }
    }
}
