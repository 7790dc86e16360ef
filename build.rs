use std::process::Command;

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout).ok().map(|s| s.trim().to_string())
}

fn main() {
    let git_hash = git(&["rev-parse", "--short", "HEAD"]).unwrap_or_else(|| "unknown".to_string());
    let is_release = git(&["describe", "--exact-match", "--tags", "HEAD"]).is_some();

    // Untagged builds report e.g. `0.3.0-dev.1a2b3c4`
    let suffix = if is_release {
        String::new()
    } else {
        format!("-dev.{}", git_hash)
    };
    println!("cargo:rustc-env=PLUGIN_HOST_VERSION_SUFFIX={}", suffix);
    println!("cargo:rustc-env=PLUGIN_HOST_GIT_HASH={}", git_hash);

    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads");
}
