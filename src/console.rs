//! Terminal stand-ins for the device UI and hardware.

use std::io::Write;

use async_trait::async_trait;
use fieldalert_core::{AlertError, AlertKind, ButtonChoice, Result};
use fieldalert_engine::{Actuator, DialogRequest, Presenter, SessionId, VibrationPattern};
use tokio::io::{AsyncBufReadExt, BufReader, Stdin};
use tokio::sync::Mutex;
use tracing::info;

/// Presents dialogs on stdout and reads the operator's choice from stdin.
pub struct ConsolePresenter {
    input: Mutex<BufReader<Stdin>>,
}

impl ConsolePresenter {
    pub fn new() -> Self {
        Self {
            input: Mutex::new(BufReader::new(tokio::io::stdin())),
        }
    }
}

impl Default for ConsolePresenter {
    fn default() -> Self {
        Self::new()
    }
}

/// Map an input line to a dialog button.
pub fn parse_choice(line: &str) -> Option<ButtonChoice> {
    match line.trim().to_ascii_lowercase().as_str() {
        "1" | "c" | "close" => Some(ButtonChoice::Close),
        "2" | "a" | "admin" => Some(ButtonChoice::OpenAdminTool),
        _ => None,
    }
}

#[async_trait]
impl Presenter for ConsolePresenter {
    async fn show_dialog(&self, request: DialogRequest) -> Result<ButtonChoice> {
        println!("\n=== [{}] {} ===", request.session, request.title);
        println!("{}", request.body);
        println!("  1) {}    2) {}", request.primary_label, request.secondary_label);

        let mut input = self.input.lock().await;
        loop {
            print!("> ");
            let _ = std::io::stdout().flush();

            let mut line = String::new();
            let read = input
                .read_line(&mut line)
                .await
                .map_err(|e| AlertError::io("reading operator choice", "<stdin>", e))?;
            if read == 0 {
                return Err(AlertError::internal("stdin closed"));
            }
            match parse_choice(&line) {
                Some(choice) => return Ok(choice),
                None => println!("enter 1 or 2"),
            }
        }
    }

    fn dismiss_dialog(&self, session: SessionId) {
        println!("\n=== [{session}] withdrawn ===");
    }

    fn show_passive_notification(&self, kind: AlertKind) {
        println!("[notification] {}", kind.title());
    }

    fn notification_active(&self, _kind: AlertKind) -> bool {
        false
    }

    fn is_foreground(&self) -> bool {
        true
    }
}

/// Rings the terminal bell in place of the alert sound.
pub struct ConsoleActuator;

impl Actuator for ConsoleActuator {
    fn play_sound(&self, duration_secs: u32) {
        print!("\x07");
        let _ = std::io::stdout().flush();
        info!(duration_secs, "alert sound");
    }

    fn vibrate(&self, pattern: VibrationPattern) {
        info!(?pattern, "vibrate");
    }

    fn is_muted(&self) -> bool {
        false
    }
}
