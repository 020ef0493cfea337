use std::{env, process::Command};

use time::{macros::format_description, OffsetDateTime};

fn main() {
	println!(
		"cargo:rustc-env=BUILD_DATE={}",
		OffsetDateTime::now_utc()
			.format(format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]Z"))
			.unwrap()
	);
	println!("cargo:rustc-env=BUILD_TARGET={}", env::var("TARGET").unwrap());
	commit_info();
}

/// Exports the commit hash and the tags pointing at it.
fn commit_info() {
	let output_bytes = match Command::new("git").arg("rev-parse").arg("HEAD").output() {
		Ok(output) if output.status.success() => output.stdout,
		_ => Vec::new(),
	};
	let output = String::from_utf8(output_bytes).unwrap_or_default();
	if let Some(commit_hash) = output.split_whitespace().next() {
		println!("cargo:rustc-env=COUCHDB_EXPORTER_COMMIT_HASH={commit_hash}");
	}

	let output_bytes = match Command::new("git").arg("tag").arg("--points-at").arg("HEAD").output()
	{
		Ok(output) if output.status.success() => output.stdout,
		_ => Vec::new(),
	};
	let output = String::from_utf8(output_bytes).unwrap_or_default();
	let tags = output.lines().collect::<Vec<_>>();
	if !tags.is_empty() {
		println!("cargo:rustc-env=COUCHDB_EXPORTER_COMMIT_TAGS={}", tags.join(","));
	}
}
