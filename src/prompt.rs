//! Terminal entry of secrets, echo-suppressed on a tty.

use secrecy::SecretString;
use std::io::IsTerminal;
use std::io::{self, BufRead, Write};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("io error")]
    Io(#[from] io::Error),

    #[error("input cannot be empty")]
    Empty,

    #[error("passwords do not match")]
    Mismatch,
}

/// Prompt twice for a brand-new master password.
pub fn new_master_password() -> Result<SecretString, PromptError> {
    let first = read_hidden_line("Master password: ")?;
    if first.is_empty() {
        return Err(PromptError::Empty);
    }
    let confirm = read_hidden_line("Confirm master password: ")?;
    if first != confirm {
        return Err(PromptError::Mismatch);
    }
    Ok(SecretString::new(first.into_boxed_str()))
}

pub fn master_password() -> Result<SecretString, PromptError> {
    let pw = read_hidden_line("Master password: ")?;
    if pw.is_empty() {
        return Err(PromptError::Empty);
    }
    Ok(SecretString::new(pw.into_boxed_str()))
}

/// Prompt for one secret field (record password, card number, ...).
pub fn secret_field(label: &str) -> Result<String, PromptError> {
    let value = read_hidden_line(&format!("{label}: "))?;
    if value.is_empty() {
        return Err(PromptError::Empty);
    }
    Ok(value)
}

/// Like [`secret_field`], but an empty answer means "leave it out".
pub fn optional_secret_field(label: &str) -> Result<Option<String>, PromptError> {
    let value = read_hidden_line(&format!("{label} (optional): "))?;
    if value.is_empty() {
        return Ok(None);
    }
    Ok(Some(value))
}

fn read_hidden_line(label: &str) -> Result<String, PromptError> {
    eprint!("{label}");
    io::stderr().flush()?;

    if io::stdin().is_terminal() {
        #[cfg(unix)]
        {
            let guard = EchoGuard::suppress();
            let line = read_plain_line()?;
            drop(guard);
            eprintln!();
            return Ok(line);
        }
    }

    read_plain_line()
}

fn read_plain_line() -> Result<String, PromptError> {
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\n', '\r']).to_string())
}

/// Turns terminal echo off for its lifetime; restores the original state on
/// drop even if reading fails.
#[cfg(unix)]
struct EchoGuard {
    fd: i32,
    original: Option<libc::termios>,
}

#[cfg(unix)]
impl EchoGuard {
    fn suppress() -> Self {
        use std::mem::MaybeUninit;
        use std::os::unix::io::AsRawFd;

        let fd = io::stdin().as_raw_fd();
        unsafe {
            let mut original = MaybeUninit::<libc::termios>::uninit();
            if libc::tcgetattr(fd, original.as_mut_ptr()) != 0 {
                return Self { fd, original: None };
            }
            let original = original.assume_init();

            let mut silenced = original;
            silenced.c_lflag &= !(libc::ECHO | libc::ECHONL);
            if libc::tcsetattr(fd, libc::TCSANOW, &silenced) != 0 {
                return Self { fd, original: None };
            }

            Self {
                fd,
                original: Some(original),
            }
        }
    }
}

#[cfg(unix)]
impl Drop for EchoGuard {
    fn drop(&mut self) {
        if let Some(original) = self.original {
            unsafe {
                let _ = libc::tcsetattr(self.fd, libc::TCSANOW, &original);
            }
        }
    }
}
