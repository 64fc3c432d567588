#![allow(dead_code)]

use std::{future::Future, time::Duration};

use guidedog::Config;

pub fn tracing_init() {
	use tracing_subscriber::{
		fmt::{format::FmtSpan, Subscriber},
		util::SubscriberInitExt,
		EnvFilter,
	};
	Subscriber::builder()
		.pretty()
		.with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
		.with_env_filter(EnvFilter::from_default_env())
		.finish()
		.try_init()
		.ok();
}

pub fn sh(script: &str) -> Vec<String> {
	vec!["sh".into(), "-c".into(), script.into()]
}

pub fn config(script: &str) -> Config {
	tracing_init();
	let mut config = Config::new(sh(script));
	config.graceful_timeout = Duration::from_secs(2);
	config
}

/// Polls `check` until it holds, panicking after a few seconds.
pub async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
	let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
	while !check() {
		assert!(
			tokio::time::Instant::now() < deadline,
			"timed out waiting for {what}"
		);
		tokio::time::sleep(Duration::from_millis(10)).await;
	}
}

/// Awaits `fut`, panicking after a few seconds.
pub async fn within<T>(what: &str, fut: impl Future<Output = T>) -> T {
	tokio::time::timeout(Duration::from_secs(10), fut)
		.await
		.unwrap_or_else(|_| panic!("timed out waiting for {what}"))
}
