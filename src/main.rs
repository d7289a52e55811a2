//! QRSL Encounter
//!
//! Attaches to the running qrsl.exe window and farms world boss chests
//! until the configured loop count is reached or Ctrl+Shift+Q is pressed.

#[cfg(windows)]
fn main() -> anyhow::Result<()> {
    app::run()
}

#[cfg(not(windows))]
fn main() -> anyhow::Result<()> {
    anyhow::bail!("qrsl-encounter drives a Windows game window and only runs on Windows")
}

#[cfg(windows)]
mod app {
    use anyhow::{Context, Result};
    use std::sync::Arc;
    use std::time::Duration;

    use windows::Win32::Foundation::HWND;
    use windows::Win32::UI::Input::KeyboardAndMouse::{
        MOD_CONTROL, MOD_NOREPEAT, MOD_SHIFT, RegisterHotKey, UnregisterHotKey,
    };
    use windows::Win32::UI::WindowsAndMessaging::{MSG, PM_REMOVE, PeekMessageW, WM_HOTKEY};

    use qrsl_encounter::capture::{WindowCapture, find_game_window};
    use qrsl_encounter::config::{load_or_default, millis, resolve_config_path};
    use qrsl_encounter::encounter::{FileDiagnostics, RunHandle, RunOutcome, start_run};
    use qrsl_encounter::input::InputDevice;
    use qrsl_encounter::input::sendinput::SendInputDevice;
    use qrsl_encounter::vision::{
        DetectionGateway, Perception, TemplateMatcher, TesseractReader, ensure_tesseract,
    };
    use qrsl_encounter::{init_logging, paths};

    const HOTKEY_ABORT: i32 = 1;
    /// 'Q'
    const HOTKEY_ABORT_VK: u32 = 0x51;

    pub fn run() -> Result<()> {
        paths::ensure_directories()?;
        init_logging(&paths::get_logs_dir())?;
        install_panic_hook();

        unsafe {
            windows::Win32::System::WinRT::RoInitialize(
                windows::Win32::System::WinRT::RO_INIT_MULTITHREADED,
            )?
        };

        let config_path = resolve_config_path();
        let config = load_or_default(&config_path);

        let window = find_game_window()?;
        let tesseract = ensure_tesseract(&config.ocr_language)
            .context("OCR is required for chest approach")?;
        let matcher =
            TemplateMatcher::load_dir(&paths::get_templates_dir(), config.templates.clone())?;
        let gateway = DetectionGateway::new(
            Box::new(WindowCapture::new(window)),
            Box::new(matcher),
            Box::new(TesseractReader::new(tesseract, config.ocr_language.clone())),
        )
        .with_frame_max_age(millis(config.frame_max_age_ms));
        let perception: Arc<dyn Perception> = Arc::new(gateway);

        let device = SendInputDevice::new(window);
        device.focus();
        let input: Arc<dyn InputDevice> = Arc::new(device);
        let diagnostics = Arc::new(FileDiagnostics::new(
            perception.clone(),
            paths::get_screenshots_dir(),
        ));

        // Thread hotkey: WM_HOTKEY lands in this thread's queue
        unsafe {
            RegisterHotKey(
                HWND::default(),
                HOTKEY_ABORT,
                MOD_CONTROL | MOD_SHIFT | MOD_NOREPEAT,
                HOTKEY_ABORT_VK,
            )?;
        }

        let handle = start_run(perception, input, diagnostics, config)?;
        tracing::info!("encounter running, press Ctrl+Shift+Q to abort");
        let outcome = wait_for_run(handle);

        unsafe {
            let _ = UnregisterHotKey(HWND::default(), HOTKEY_ABORT);
        }

        match outcome {
            RunOutcome::Completed(summary) => {
                tracing::info!(
                    iterations = summary.iterations,
                    completed = summary.completed,
                    skipped = summary.skipped,
                    "run finished"
                );
                Ok(())
            }
            RunOutcome::Cancelled => {
                tracing::info!("run aborted");
                Ok(())
            }
            RunOutcome::Failed(e) => {
                tracing::error!(error = %format!("{:#}", e), "run failed");
                Err(e)
            }
        }
    }

    /// Pumps the message queue for the abort hotkey until the run ends.
    fn wait_for_run(handle: RunHandle) -> RunOutcome {
        let mut msg = MSG::default();
        while !handle.is_finished() {
            unsafe {
                while PeekMessageW(&mut msg, HWND::default(), 0, 0, PM_REMOVE).as_bool() {
                    if msg.message == WM_HOTKEY && msg.wParam.0 as i32 == HOTKEY_ABORT {
                        tracing::info!("abort hotkey pressed");
                        handle.abort();
                    }
                }
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        handle.join()
    }

    fn install_panic_hook() {
        std::panic::set_hook(Box::new(|panic_info| {
            let msg = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
                s.clone()
            } else {
                "Unknown panic".to_string()
            };
            let location = panic_info
                .location()
                .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()))
                .unwrap_or_default();
            tracing::error!(location = %location, "panic: {}", msg);
        }));
    }
}
