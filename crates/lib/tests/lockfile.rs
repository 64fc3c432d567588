#![cfg(unix)]

use std::{
	sync::{Arc, Barrier},
	thread,
};

use guidedog::{error::LockError, lockfile::Lockfile};

#[test]
fn exactly_one_concurrent_acquire_wins() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("guide-dog.lock");
	let barrier = Arc::new(Barrier::new(2));

	let attempts: Vec<_> = (0..2)
		.map(|_| {
			let path = path.clone();
			let barrier = barrier.clone();
			thread::spawn(move || {
				let mut lock = Lockfile::new(path);
				barrier.wait();
				let won = lock.acquire().is_ok();
				// hold it until both have tried
				barrier.wait();
				won
			})
		})
		.collect();

	let wins = attempts
		.into_iter()
		.map(|t| t.join().unwrap())
		.filter(|won| *won)
		.count();
	assert_eq!(wins, 1);
}

#[test]
fn second_holder_fails_until_release() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("guide-dog.lock");

	let mut first = Lockfile::new(&path);
	let mut second = Lockfile::new(&path);

	first.acquire().unwrap();
	assert!(matches!(second.acquire(), Err(LockError::Contended { .. })));
	assert!(!second.is_held());

	first.release().unwrap();
	second.acquire().unwrap();
	assert!(second.is_held());
	second.release().unwrap();
}

#[test]
fn unopenable_path_is_an_error() {
	let dir = tempfile::tempdir().unwrap();
	let mut lock = Lockfile::new(dir.path().join("missing").join("guide-dog.lock"));
	assert!(matches!(lock.acquire(), Err(LockError::Open { .. })));
}
