//! Notification presenter.
//!
//! Renders one `PageRequest` on a host: a self-dismissing banner, an audio
//! cue, a vibration where the host has one, and a flashing title. Each
//! effect is independent; only a failure to show the banner is reported to
//! the caller.

pub mod audio;
pub mod terminal;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::{AbortHandle, JoinHandle};

use crate::config::PresenterConfig;
use crate::error::Result;
use crate::pages::{PageAgent, PageRequest};

pub use audio::AudioChain;
pub use terminal::TerminalHost;

pub const VIBRATION_PATTERN_MS: [u64; 3] = [200, 100, 200];
pub const FLASH_MARKER: &str = "🔔";

/// Surface a presenter draws on
pub trait PageHost: Send + Sync {
    fn label(&self) -> String;

    fn show_banner(&self, title: &str, message: &str) -> Result<()>;

    fn dismiss_banner(&self) -> Result<()>;

    fn title(&self) -> String;

    fn set_title(&self, title: &str) -> Result<()>;

    /// Remember the current title before a flash first changes it
    fn save_title(&self) -> Result<()> {
        Ok(())
    }

    /// Show the title remembered by `save_title` again. With `keep_saved`
    /// it stays remembered for the next flip; hosts that cannot read their
    /// own title fall back to `original`.
    fn restore_title(&self, original: &str, _keep_saved: bool) -> Result<()> {
        self.set_title(original)
    }

    fn supports_vibration(&self) -> bool {
        false
    }

    fn vibrate(&self, _pattern_ms: &[u64]) -> Result<()> {
        Ok(())
    }

    /// Play an in-memory WAV file to completion
    fn play_wav(&self, wav: &[u8]) -> anyhow::Result<()>;

    fn speak(&self, phrase: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct PresenterSettings {
    pub banner: Duration,
    pub flash_cycles: u32,
    pub flash_interval: Duration,
}

impl Default for PresenterSettings {
    fn default() -> Self {
        Self::from(&PresenterConfig::default())
    }
}

impl From<&PresenterConfig> for PresenterSettings {
    fn from(config: &PresenterConfig) -> Self {
        Self {
            banner: Duration::from_secs(config.banner_secs),
            flash_cycles: config.title_flash_cycles,
            flash_interval: Duration::from_millis(config.title_flash_interval_ms),
        }
    }
}

struct Flash {
    generation: u64,
    original: String,
    abort: AbortHandle,
}

pub struct Presenter {
    host: Arc<dyn PageHost>,
    audio: Arc<AudioChain>,
    settings: PresenterSettings,
    banner_generation: Arc<AtomicU64>,
    flash_generation: AtomicU64,
    flash: Arc<Mutex<Option<Flash>>>,
}

impl Presenter {
    pub fn new(host: Arc<dyn PageHost>, audio: AudioChain, settings: PresenterSettings) -> Self {
        Self {
            host,
            audio: Arc::new(audio),
            settings,
            banner_generation: Arc::new(AtomicU64::new(0)),
            flash_generation: AtomicU64::new(0),
            flash: Arc::new(Mutex::new(None)),
        }
    }

    /// Presenter with the standard audio chain
    pub fn with_host(host: Arc<dyn PageHost>, settings: PresenterSettings) -> Self {
        Self::new(host, AudioChain::standard(), settings)
    }

    /// Render a notification. Returns once the banner is up; dismissal,
    /// audio and title flashing continue in the background.
    pub async fn show(&self, title: &str, message: &str) -> Result<()> {
        self.host.show_banner(title, message)?;
        self.schedule_dismiss();

        self.play_sound();

        if self.host.supports_vibration() {
            if let Err(err) = self.host.vibrate(&VIBRATION_PATTERN_MS) {
                tracing::debug!(%err, "vibration failed");
            }
        }

        self.flash_title(title);
        Ok(())
    }

    /// Run the audio chain off the async runtime
    pub fn play_sound(&self) -> JoinHandle<Option<&'static str>> {
        let host = Arc::clone(&self.host);
        let audio = Arc::clone(&self.audio);
        tokio::task::spawn_blocking(move || audio.play(host.as_ref()))
    }

    /// Dismiss the banner after the configured delay unless a newer banner
    /// replaced it in the meantime
    fn schedule_dismiss(&self) {
        let generation = self.banner_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let current = Arc::clone(&self.banner_generation);
        let host = Arc::clone(&self.host);
        let delay = self.settings.banner;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if current.load(Ordering::SeqCst) == generation {
                if let Err(err) = host.dismiss_banner() {
                    tracing::debug!(%err, "banner dismissal failed");
                }
            }
        });
    }

    /// Alternate the host title with a marked one, then restore it
    ///
    /// A flash that starts while another is running takes over its original
    /// title, so the restored title is always the one from before any flash.
    pub fn flash_title(&self, title: &str) -> JoinHandle<()> {
        let mut slot = self
            .flash
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let original = match slot.take() {
            Some(previous) => {
                previous.abort.abort();
                previous.original
            }
            None => {
                if let Err(err) = self.host.save_title() {
                    tracing::debug!(%err, "could not save title");
                }
                self.host.title()
            }
        };

        let host = Arc::clone(&self.host);
        let flash = Arc::clone(&self.flash);
        let marked = format!("{FLASH_MARKER} {title}");
        let restore = original.clone();
        let generation = self.flash_generation.fetch_add(1, Ordering::SeqCst);
        let cycles = self.settings.flash_cycles;
        let interval = self.settings.flash_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
            ticker.tick().await;
            for tick in 0..cycles {
                ticker.tick().await;
                let flipped = if tick % 2 == 0 {
                    host.set_title(&marked)
                } else {
                    host.restore_title(&restore, true)
                };
                if let Err(err) = flipped {
                    tracing::debug!(%err, "title update failed");
                }
            }
            if let Err(err) = host.restore_title(&restore, false) {
                tracing::debug!(%err, "title restore failed");
            }
            let mut slot = flash.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if slot.as_ref().is_some_and(|f| f.generation == generation) {
                slot.take();
            }
        });

        *slot = Some(Flash {
            generation,
            original,
            abort: handle.abort_handle(),
        });
        handle
    }
}

#[async_trait]
impl PageAgent for Presenter {
    fn label(&self) -> String {
        self.host.label()
    }

    async fn deliver(&self, request: &PageRequest) -> Result<()> {
        match request {
            PageRequest::ShowNotification { title, message } => self.show(title, message).await,
            PageRequest::PlaySound => {
                self.play_sound();
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;

    #[derive(Default)]
    struct RecordingHost {
        title: Mutex<String>,
        titles: Mutex<Vec<String>>,
        banners: Mutex<Vec<(String, String)>>,
        dismissed: AtomicU64,
        wav_attempts: AtomicU64,
        spoken: Mutex<Vec<String>>,
        wav_works: bool,
        speech_works: bool,
        saves: AtomicU64,
        final_restores: AtomicU64,
    }

    impl RecordingHost {
        fn titled(title: &str) -> Self {
            Self {
                title: Mutex::new(title.to_string()),
                ..Self::default()
            }
        }
    }

    impl PageHost for RecordingHost {
        fn label(&self) -> String {
            "recording".to_string()
        }

        fn show_banner(&self, title: &str, message: &str) -> Result<()> {
            self.banners
                .lock()
                .unwrap()
                .push((title.to_string(), message.to_string()));
            Ok(())
        }

        fn dismiss_banner(&self) -> Result<()> {
            self.dismissed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn title(&self) -> String {
            self.title.lock().unwrap().clone()
        }

        fn set_title(&self, title: &str) -> Result<()> {
            *self.title.lock().unwrap() = title.to_string();
            self.titles.lock().unwrap().push(title.to_string());
            Ok(())
        }

        fn save_title(&self) -> Result<()> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn restore_title(&self, original: &str, keep_saved: bool) -> Result<()> {
            if !keep_saved {
                self.final_restores.fetch_add(1, Ordering::SeqCst);
            }
            self.set_title(original)
        }

        fn play_wav(&self, _wav: &[u8]) -> anyhow::Result<()> {
            self.wav_attempts.fetch_add(1, Ordering::SeqCst);
            if self.wav_works {
                Ok(())
            } else {
                bail!("no audio device")
            }
        }

        fn speak(&self, phrase: &str) -> anyhow::Result<()> {
            if !self.speech_works {
                bail!("no speech engine");
            }
            self.spoken.lock().unwrap().push(phrase.to_string());
            Ok(())
        }
    }

    fn fast_settings(cycles: u32) -> PresenterSettings {
        PresenterSettings {
            banner: Duration::from_millis(10),
            flash_cycles: cycles,
            flash_interval: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn title_flash_alternates_then_restores() {
        let host = Arc::new(RecordingHost::titled("Inbox"));
        let presenter = Presenter::with_host(host.clone(), fast_settings(6));

        presenter.flash_title("AI Reminder").await.unwrap();

        let marked = "🔔 AI Reminder".to_string();
        let inbox = "Inbox".to_string();
        assert_eq!(
            host.titles.lock().unwrap().as_slice(),
            &[
                marked.clone(),
                inbox.clone(),
                marked.clone(),
                inbox.clone(),
                marked,
                inbox.clone(),
                inbox.clone(),
            ]
        );
        assert_eq!(host.title(), inbox);
        assert_eq!(host.saves.load(Ordering::SeqCst), 1);
        assert_eq!(host.final_restores.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn overlapping_flash_restores_the_first_original() {
        let host = Arc::new(RecordingHost::titled("Inbox"));
        let presenter = Presenter::with_host(host.clone(), fast_settings(1_000));

        let first = presenter.flash_title("first");
        tokio::time::sleep(Duration::from_millis(5)).await;

        let second = PresenterSettings {
            flash_cycles: 3,
            ..fast_settings(3)
        };
        let presenter = Presenter {
            settings: second,
            ..presenter
        };
        presenter.flash_title("second").await.unwrap();

        assert!(first.await.unwrap_err().is_cancelled());
        assert_eq!(host.title(), "Inbox");
        assert_eq!(host.saves.load(Ordering::SeqCst), 1);
        assert_eq!(host.final_restores.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn banner_dismisses_itself() {
        let host = Arc::new(RecordingHost::titled("Inbox"));
        let presenter = Presenter::with_host(host.clone(), fast_settings(0));

        presenter
            .deliver(&PageRequest::ShowNotification {
                title: "AI Reminder".to_string(),
                message: "Stretch".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(host.banners.lock().unwrap().len(), 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(host.dismissed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn play_sound_skips_banner() {
        let host = Arc::new(RecordingHost {
            wav_works: true,
            ..RecordingHost::titled("Inbox")
        });
        let presenter = Presenter::with_host(host.clone(), fast_settings(0));

        presenter.deliver(&PageRequest::PlaySound).await.unwrap();
        let played = presenter.play_sound().await.unwrap();

        assert_eq!(played, Some("tone_sequence"));
        assert!(host.banners.lock().unwrap().is_empty());
    }

    #[test]
    fn audio_chain_falls_through_in_order() {
        let host = RecordingHost {
            speech_works: true,
            ..RecordingHost::default()
        };
        assert_eq!(AudioChain::standard().play(&host), Some("spoken_cue"));
        assert_eq!(host.wav_attempts.load(Ordering::SeqCst), 2);
        assert_eq!(host.spoken.lock().unwrap().as_slice(), &["ding".to_string()]);
    }

    #[test]
    fn audio_chain_stops_at_first_success() {
        let host = RecordingHost {
            wav_works: true,
            speech_works: true,
            ..RecordingHost::default()
        };
        assert_eq!(AudioChain::standard().play(&host), Some("tone_sequence"));
        assert_eq!(host.wav_attempts.load(Ordering::SeqCst), 1);
        assert!(host.spoken.lock().unwrap().is_empty());
    }

    #[test]
    fn audio_chain_swallows_total_failure() {
        let host = RecordingHost::default();
        assert_eq!(AudioChain::standard().play(&host), None);
    }
}
