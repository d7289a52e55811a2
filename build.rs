use std::env;
use std::fs;
use std::path::{Path, PathBuf};

fn main() {
    // Embed the Windows manifest that requests administrator privileges;
    // SendInput into an elevated game window needs them.
    if env::var("CARGO_CFG_WINDOWS").is_ok() {
        let _ = embed_resource::compile("qrsl-encounter.rc", embed_resource::NONE);
    }

    let Some(target_dir) = target_dir() else {
        return;
    };

    // Copy templates and config next to the executable
    let templates_src = Path::new("assets/templates");
    if templates_src.exists() {
        copy_dir_recursive(templates_src, &target_dir.join("assets").join("templates"));
        println!("cargo:rerun-if-changed=assets/templates/");
    }

    let config_src = Path::new("config.json");
    if config_src.exists() {
        let _ = fs::copy(config_src, target_dir.join("config.json"));
        println!("cargo:rerun-if-changed=config.json");
    }
}

/// OUT_DIR is target/<profile>/build/<pkg>-<hash>/out; the executable lives
/// three levels up.
fn target_dir() -> Option<PathBuf> {
    let out_dir = env::var("OUT_DIR").ok()?;
    Path::new(&out_dir).ancestors().nth(3).map(Path::to_path_buf)
}

/// Recursively copies a directory and its contents.
fn copy_dir_recursive(src: &Path, dst: &Path) {
    let _ = fs::create_dir_all(dst);

    if let Ok(entries) = fs::read_dir(src) {
        for entry in entries.flatten() {
            let src_path = entry.path();
            let dst_path = dst.join(entry.file_name());

            if src_path.is_dir() {
                copy_dir_recursive(&src_path, &dst_path);
            } else {
                let _ = fs::copy(&src_path, &dst_path);
            }
        }
    }
}
