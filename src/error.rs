use thiserror::Error;

/// Errores del orquestador de reproducción.
///
/// Los mensajes son los que ve el usuario en Discord, por eso están en
/// el mismo idioma que el resto de la interfaz.
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("la cola está llena (máximo {0} canciones)")]
    QueueFull(usize),

    #[error("posición inválida, ingresa un número entre 1 y {0}")]
    InvalidPosition(usize),

    #[error("debes estar en el mismo canal de voz que el bot")]
    NotInVoiceChannel,

    #[error("no hay una sesión de reproducción activa en este servidor")]
    NoActiveSession,

    #[error(transparent)]
    Resolution(#[from] ResolveError),

    #[error("no se pudo conectar al canal de voz: {0}")]
    TransportJoin(String),

    #[error("falló la reproducción: {0}")]
    TransportPlayback(String),
}

/// Fallos al resolver una URL o búsqueda a un medio reproducible.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("el video es privado o no está disponible")]
    Private,

    #[error("no se puede reproducir un video con restricción de edad")]
    AgeRestricted,

    #[error("el video no está disponible o fue eliminado")]
    Unavailable,

    #[error("no se pudo obtener el video (¿bloqueado por región?)")]
    RegionLocked,

    #[error("las transmisiones en vivo no están soportadas")]
    LiveNotSupported,

    #[error("ocurrió un error al buscar o resolver: {0}")]
    Generic(String),
}

/// Resultado de operar sobre un mensaje de Discord que ya publicamos.
///
/// `NotFound` es benigno: el mensaje fue borrado por alguien más y la
/// referencia simplemente se descarta.
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("mensaje no encontrado")]
    NotFound,

    #[error("operación sobre mensaje falló: {0}")]
    Other(String),
}
