//! User-facing notification channel
//!
//! Only unrecoverable per-file and per-session problems, and remote sync
//! progress, go through here. Routine skips stay in the log.

use std::sync::Mutex;

use crate::logging::*;

/// A message for the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
	pub title: String,
	pub text: Option<String>,
	/// Reply channel of a remote command, if any
	pub channel: Option<String>,
	/// User who issued a remote command, if any
	pub user: Option<String>,
}

impl Notification {
	pub fn new(title: impl Into<String>) -> Self {
		Notification { title: title.into(), text: None, channel: None, user: None }
	}

	pub fn with_text(mut self, text: impl Into<String>) -> Self {
		self.text = Some(text.into());
		self
	}

	pub fn reply_to(mut self, channel: Option<String>, user: Option<String>) -> Self {
		self.channel = channel;
		self.user = user;
		self
	}
}

/// Callback for user-facing notifications
pub trait Notifier: Send + Sync {
	fn notify(&self, notification: Notification);
}

/// Default notifier that drops everything
pub struct NoNotifier;

impl Notifier for NoNotifier {
	fn notify(&self, _notification: Notification) {}
}

/// Routes notifications into the log
pub struct LogNotifier;

impl Notifier for LogNotifier {
	fn notify(&self, n: Notification) {
		let to = match (&n.channel, &n.user) {
			(Some(c), Some(u)) => format!(" [{}/{}]", c, u),
			(Some(c), None) => format!(" [{}]", c),
			(None, Some(u)) => format!(" [{}]", u),
			(None, None) => String::new(),
		};
		match n.text {
			Some(text) => warn!(target: "linkmirror::notify", "{}{}: {}", n.title, to, text),
			None => warn!(target: "linkmirror::notify", "{}{}", n.title, to),
		}
	}
}

/// Collects notifications in memory, oldest first
#[derive(Default)]
pub struct MemoryNotifier {
	sent: Mutex<Vec<Notification>>,
}

impl MemoryNotifier {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn sent(&self) -> Vec<Notification> {
		self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
	}
}

impl Notifier for MemoryNotifier {
	fn notify(&self, notification: Notification) {
		self.sent.lock().unwrap_or_else(|e| e.into_inner()).push(notification);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_memory_notifier_keeps_order() {
		let notifier = MemoryNotifier::new();
		notifier.notify(Notification::new("first"));
		notifier.notify(Notification::new("second").with_text("details"));
		let sent = notifier.sent();
		assert_eq!(sent.len(), 2);
		assert_eq!(sent[0].title, "first");
		assert_eq!(sent[1].text.as_deref(), Some("details"));
	}

	#[test]
	fn test_reply_to() {
		let n = Notification::new("done").reply_to(Some("telegram".into()), Some("42".into()));
		assert_eq!(n.channel.as_deref(), Some("telegram"));
		assert_eq!(n.user.as_deref(), Some("42"));
	}
}
