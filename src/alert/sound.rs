use rodio::{OutputStream, Sink};
use std::sync::{
    mpsc::{self, Sender},
    Arc, Mutex,
};
use std::thread;

use async_trait::async_trait;

use super::tone::AlarmTone;
use super::{AlertChannel, PresentationError};
use crate::monitor::state::AlarmDetails;

enum SoundCommand {
    Ring { volume: f32 },
    Stop,
}

/// Plays the alarm tone on a dedicated thread that owns the non-Send output
/// stream. The tone loops until `stop` is called.
pub struct AlarmSoundEngine {
    tx: Arc<Mutex<Option<Sender<SoundCommand>>>>,
}

impl AlarmSoundEngine {
    pub fn new() -> Self {
        Self {
            tx: Arc::new(Mutex::new(None)),
        }
    }

    fn ensure_thread(&self) -> Result<Sender<SoundCommand>, String> {
        if let Some(tx) = self.tx.lock().map_err(|e| e.to_string())?.as_ref() {
            return Ok(tx.clone());
        }

        let (tx, rx) = mpsc::channel::<SoundCommand>();

        thread::Builder::new()
            .name("alarm-sound".to_string())
            .spawn(move || {
                let mut _stream: Option<OutputStream> = None;
                let mut sink: Option<Sink> = None;

                while let Ok(cmd) = rx.recv() {
                    match cmd {
                        SoundCommand::Ring { volume } => {
                            if let Some(s_old) = sink.take() {
                                s_old.stop();
                            }
                            _stream = None;

                            let opened = OutputStream::try_default()
                                .map_err(|e| format!("Failed to create audio output stream: {}", e))
                                .and_then(|(stream, handle)| {
                                    Sink::try_new(&handle)
                                        .map(|new_sink| (stream, new_sink))
                                        .map_err(|e| format!("Failed to create audio sink: {}", e))
                                });

                            match opened {
                                Ok((stream, new_sink)) => {
                                    new_sink.append(AlarmTone::new(volume));
                                    new_sink.play();
                                    _stream = Some(stream);
                                    sink = Some(new_sink);
                                }
                                Err(err) => {
                                    log::warn!("alarm sound unavailable: {err}");
                                }
                            }
                        }
                        SoundCommand::Stop => {
                            if let Some(s_old) = sink.take() {
                                s_old.stop();
                            }
                            _stream = None;
                        }
                    }
                }
            })
            .map_err(|e| e.to_string())?;

        let tx_clone = tx.clone();
        *self.tx.lock().map_err(|e| e.to_string())? = Some(tx);
        Ok(tx_clone)
    }

    pub fn ring(&self, volume: f32) -> Result<(), String> {
        let tx = self.ensure_thread()?;
        tx.send(SoundCommand::Ring { volume }).map_err(|e| e.to_string())
    }

    pub fn stop(&self) -> Result<(), String> {
        if let Ok(Some(tx)) = self.tx.lock().map(|g| g.clone()) {
            let _ = tx.send(SoundCommand::Stop);
        }
        Ok(())
    }
}

impl Default for AlarmSoundEngine {
    fn default() -> Self {
        Self::new()
    }
}

pub struct SoundChannel {
    engine: AlarmSoundEngine,
    enabled: bool,
    volume: f32,
}

impl SoundChannel {
    pub fn new(enabled: bool, volume: f32) -> Self {
        Self {
            engine: AlarmSoundEngine::new(),
            enabled,
            volume,
        }
    }
}

#[async_trait]
impl AlertChannel for SoundChannel {
    fn name(&self) -> &str {
        "sound"
    }

    async fn present(&self, _alarm: &AlarmDetails) -> Result<(), PresentationError> {
        if !self.enabled {
            return Err(PresentationError::Unavailable {
                channel: self.name().into(),
                reason: "alarm sound disabled in settings".into(),
            });
        }
        self.engine
            .ring(self.volume)
            .map_err(|reason| PresentationError::Failed {
                channel: self.name().into(),
                reason,
            })
    }

    async fn silence(&self) -> Result<(), PresentationError> {
        self.engine.stop().map_err(|reason| PresentationError::Failed {
            channel: self.name().into(),
            reason,
        })
    }
}
