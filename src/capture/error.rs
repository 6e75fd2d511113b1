// src/capture/error.rs
// Capture error taxonomy surfaced to the chat screen

use crate::stt::TranscriptionError;
use thiserror::Error;

/// Every failure a capture session can end with.
///
/// `Display` is the human-readable (pt-BR) message stored in the
/// controller's error slot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("Permissão de microfone negada. Habilite nas configurações do dispositivo.")]
    PermissionDenied,

    #[error("Seu navegador não suporta reconhecimento de voz. Use Chrome ou Edge.")]
    UnsupportedPlatform,

    #[error("Nenhum áudio foi capturado. Tente gravar novamente.")]
    EmptyCapture,

    #[error("Gravação capturada, mas transcrição falhou. Verifique sua conexão e tente novamente.")]
    NetworkFailure(String),

    #[error("{0}")]
    ServiceError(String),

    #[error("Erro no reconhecimento: {0}")]
    RecognitionError(String),

    #[error("Erro ao iniciar gravação")]
    StartFailed(String),
}

impl From<TranscriptionError> for CaptureError {
    fn from(err: TranscriptionError) -> Self {
        match err {
            TranscriptionError::NetworkError(detail) => CaptureError::NetworkFailure(detail),
            TranscriptionError::TimeoutError => {
                CaptureError::NetworkFailure("request timed out".to_string())
            }
            TranscriptionError::EmptyAudio => CaptureError::EmptyCapture,
            TranscriptionError::ServiceError { message, .. } => CaptureError::ServiceError(message),
            TranscriptionError::PayloadTooLarge { .. } => CaptureError::ServiceError(
                "Arquivo muito grande. Maximo: 25MB".to_string(),
            ),
            TranscriptionError::InvalidResponse(detail) => {
                CaptureError::ServiceError(format!("Resposta inválida do servidor: {}", detail))
            }
        }
    }
}

/// Outcome of one capture session.
pub type TranscriptionResult = Result<String, CaptureError>;
