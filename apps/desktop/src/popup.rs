use std::{
    io::{self, BufRead, Write},
    sync::Mutex,
};

use client_core::{FormField, FormView, Notifier};
use tracing::warn;

/// The popup's three inputs after the user has filled them in.
#[derive(Default)]
pub struct PopupForm {
    email: String,
    password: String,
    sheet_id: String,
}

impl PopupForm {
    pub fn new(email: Option<String>, password: Option<String>, sheet_id: Option<String>) -> Self {
        Self {
            email: email.unwrap_or_default(),
            password: password.unwrap_or_default(),
            sheet_id: sheet_id.unwrap_or_default(),
        }
    }
}

impl FormView for PopupForm {
    fn field_value(&self, field: FormField) -> String {
        match field {
            FormField::Email => self.email.clone(),
            FormField::Password => self.password.clone(),
            FormField::SheetId => self.sheet_id.clone(),
        }
    }
}

pub fn label(field: FormField) -> &'static str {
    match field {
        FormField::Email => "Email",
        FormField::Password => "Password",
        FormField::SheetId => "Google Sheet ID",
    }
}

/// Fills each field from `preset` or, when absent, by prompting on `output` and reading a line.
pub fn collect_form<R: BufRead, W: Write>(
    preset: PopupForm,
    input: &mut R,
    output: &mut W,
) -> io::Result<PopupForm> {
    let mut form = preset;
    for field in FormField::ALL {
        let slot = match field {
            FormField::Email => &mut form.email,
            FormField::Password => &mut form.password,
            FormField::SheetId => &mut form.sheet_id,
        };
        if !slot.is_empty() {
            continue;
        }
        write!(output, "{}: ", label(field))?;
        output.flush()?;
        *slot = read_line(input)?;
    }
    Ok(form)
}

fn read_line<R: BufRead>(input: &mut R) -> io::Result<String> {
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Prints the message and holds until the user presses Enter, like a modal alert.
pub struct TerminalNotifier<R, W> {
    io: Mutex<(R, W)>,
}

impl<R, W> TerminalNotifier<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            io: Mutex::new((input, output)),
        }
    }

    pub fn into_inner(self) -> (R, W) {
        self.io.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

impl<R: BufRead + Send, W: Write + Send> Notifier for TerminalNotifier<R, W> {
    fn notify(&self, message: &str) {
        let mut guard = self.io.lock().unwrap_or_else(|e| e.into_inner());
        let (input, output) = &mut *guard;
        let shown = writeln!(output, "\n  {message}")
            .and_then(|_| write!(output, "  [press Enter] "))
            .and_then(|_| output.flush());
        if let Err(error) = shown.and_then(|_| read_line(input).map(drop)) {
            warn!(%error, "notification could not wait for acknowledgement");
        }
    }
}

#[cfg(test)]
#[path = "tests/popup_tests.rs"]
mod tests;
