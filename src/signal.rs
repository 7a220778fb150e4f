//! Latest-value-wins signal cells shared between the control loops.
//!
//! Thin wrappers over [`tokio::sync::watch`]: a cell has exactly one
//! [`SignalWriter`] and any number of [`SignalReader`]s, values are replaced
//! wholesale, and reads are synchronous so the sensing loop never awaits the
//! actuator.

use tokio::sync::watch;

/// Create a signal cell holding `initial`
pub fn channel<T: Clone>(initial: T) -> (SignalWriter<T>, SignalReader<T>) {
    let (tx, rx) = watch::channel(initial);
    (SignalWriter { tx }, SignalReader { rx })
}

/// The single write half of a signal cell. Not `Clone`.
#[derive(Debug)]
pub struct SignalWriter<T> {
    tx: watch::Sender<T>,
}

impl<T: Clone> SignalWriter<T> {
    /// Replace the value, returning the previous one
    pub fn set(&self, value: T) -> T {
        self.tx.send_replace(value)
    }

    /// Modify the value in place and return whatever the closure returns
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut result = None;
        self.tx.send_modify(|value| result = Some(f(value)));
        // send_modify runs the closure exactly once
        result.unwrap_or_else(|| unreachable!("signal update closure not run"))
    }

    /// Current value as seen by the writer
    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }

    /// A new reader attached to this cell
    pub fn subscribe(&self) -> SignalReader<T> {
        SignalReader {
            rx: self.tx.subscribe(),
        }
    }
}

/// A read half of a signal cell
#[derive(Debug, Clone)]
pub struct SignalReader<T> {
    rx: watch::Receiver<T>,
}

impl<T: Clone> SignalReader<T> {
    /// Current value, without marking it seen
    pub fn get(&self) -> T {
        self.rx.borrow().clone()
    }

    /// Current value, marking it seen for [`has_changed`](Self::has_changed)
    pub fn get_and_mark(&mut self) -> T {
        self.rx.borrow_and_update().clone()
    }

    /// Whether the writer stored a value since the last `get_and_mark`.
    /// A dropped writer stores nothing more, so this is then false.
    pub fn has_changed(&self) -> bool {
        self.rx.has_changed().unwrap_or(false)
    }
}
