//! Locating a Tesseract install and its language data.

use anyhow::{Context, Result, anyhow};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

const TESSDATA_REPO: &str = "https://github.com/tesseract-ocr/tessdata/raw/main";

const SYSTEM_INSTALL_DIRS: [&str; 2] = [
    r"C:\Program Files\Tesseract-OCR",
    r"C:\Program Files (x86)\Tesseract-OCR",
];

#[derive(Clone, Debug)]
pub struct TesseractPaths {
    pub executable: PathBuf,
    pub tessdata: PathBuf,
}

/// Directory for locally managed Tesseract files.
pub fn get_tesseract_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("qrsl-encounter")
        .join("tesseract")
}

fn traineddata_name(language: &str) -> String {
    format!("{}.traineddata", language)
}

/// Finds the executable and a tessdata directory holding `language`,
/// downloading the language data into the local directory if no install has it.
pub fn ensure_tesseract(language: &str) -> Result<TesseractPaths> {
    let executable = find_tesseract_executable()?;

    let tessdata = match find_tessdata_dir(language) {
        Ok(dir) => dir,
        Err(_) => {
            let local = get_tesseract_dir().join("tessdata");
            fs::create_dir_all(&local)
                .with_context(|| format!("Failed to create {}", local.display()))?;
            download_tessdata(&local, language)?;
            local
        }
    };

    tracing::info!(
        executable = %executable.display(),
        tessdata = %tessdata.display(),
        language,
        "tesseract ready"
    );
    Ok(TesseractPaths {
        executable,
        tessdata,
    })
}

/// Checks our local dir first, then PATH, then the usual install locations.
pub fn find_tesseract_executable() -> Result<PathBuf> {
    let local_exe = get_tesseract_dir().join("tesseract.exe");
    if local_exe.exists() {
        return Ok(local_exe);
    }

    if let Ok(output) = Command::new("tesseract").arg("--version").output() {
        if output.status.success() {
            return Ok(PathBuf::from("tesseract"));
        }
    }

    for dir in SYSTEM_INSTALL_DIRS {
        let p = Path::new(dir).join("tesseract.exe");
        if p.exists() {
            return Ok(p);
        }
    }

    Err(anyhow!(
        "Tesseract not found. Install Tesseract-OCR (https://github.com/UB-Mannheim/tesseract/releases), \
         add it to PATH, or copy it to {}",
        get_tesseract_dir().display()
    ))
}

pub fn find_tessdata_dir(language: &str) -> Result<PathBuf> {
    let file = traineddata_name(language);
    let mut candidates = vec![get_tesseract_dir().join("tessdata")];
    candidates.extend(
        SYSTEM_INSTALL_DIRS
            .iter()
            .map(|d| Path::new(d).join("tessdata")),
    );
    if let Ok(prefix) = std::env::var("TESSDATA_PREFIX") {
        let prefix = PathBuf::from(prefix);
        candidates.push(prefix.join("tessdata"));
        candidates.push(prefix);
    }

    candidates
        .into_iter()
        .find(|dir| dir.join(&file).exists())
        .ok_or_else(|| anyhow!("tessdata directory with {} not found", file))
}

fn download_tessdata(tessdata_dir: &Path, language: &str) -> Result<()> {
    let file = traineddata_name(language);
    let url = format!("{}/{}", TESSDATA_REPO, file);
    let target = tessdata_dir.join(&file);

    tracing::info!(%url, "downloading language data");

    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(300))
        .build()?;

    let response = client
        .get(&url)
        .header("User-Agent", "qrsl-encounter")
        .send()?;

    if !response.status().is_success() {
        return Err(anyhow!(
            "Failed to download {}: HTTP {}",
            file,
            response.status()
        ));
    }

    let bytes = response.bytes()?;
    let mut out = fs::File::create(&target)
        .with_context(|| format!("Failed to create {}", target.display()))?;
    out.write_all(&bytes)?;

    tracing::info!(bytes = bytes.len(), path = %target.display(), "language data saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_traineddata_name() {
        assert_eq!(traineddata_name("chi_sim"), "chi_sim.traineddata");
    }

    #[test]
    fn test_tesseract_dir_is_app_scoped() {
        let dir = get_tesseract_dir();
        assert!(dir.ends_with(Path::new("qrsl-encounter").join("tesseract")));
    }
}
