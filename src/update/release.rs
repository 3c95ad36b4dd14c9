//! Release descriptors from the GitHub releases API

use serde::{Deserialize, Serialize};

use super::version::Version;
use crate::error::{KeepsakeError, KeepsakeResult};

/// A published release that can be downloaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseInfo {
    pub version: Version,
    pub name: String,
    /// Direct URL of the selected asset
    pub download_url: String,
    /// File name of the selected asset
    pub asset_name: String,
    pub published_at: String,
    pub notes: String,
    /// Asset size advertised by the feed
    pub size: Option<u64>,
}

/// `GET /repos/{owner}/{repo}/releases/latest` response, reduced to what we use
#[derive(Debug, Clone, Deserialize)]
pub struct GithubRelease {
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub assets: Vec<GithubAsset>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GithubAsset {
    pub name: String,
    pub browser_download_url: String,
    #[serde(default)]
    pub size: Option<u64>,
}

impl GithubRelease {
    pub fn from_slice(bytes: &[u8]) -> KeepsakeResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| KeepsakeError::Json(format!("Unexpected release descriptor: {}", e)))
    }

    pub fn version(&self) -> KeepsakeResult<Version> {
        Version::parse(&self.tag_name)
    }

    /// Pick the executable asset: one named after the application, else any `.exe`
    pub fn select_asset(&self, app_name: &str) -> Option<&GithubAsset> {
        let app_name = app_name.to_lowercase();
        let executables = || {
            self.assets
                .iter()
                .filter(|a| a.name.to_lowercase().ends_with(".exe"))
        };

        executables()
            .find(|a| a.name.to_lowercase().contains(&app_name))
            .or_else(|| executables().next())
    }

    pub fn into_release_info(self, app_name: &str) -> KeepsakeResult<ReleaseInfo> {
        let version = self.version()?;
        let asset = self.select_asset(app_name).cloned().ok_or_else(|| {
            KeepsakeError::Json(format!(
                "Release {} has no executable asset",
                self.tag_name
            ))
        })?;

        Ok(ReleaseInfo {
            version,
            name: self
                .name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| format!("Version {}", version)),
            download_url: asset.browser_download_url,
            asset_name: asset.name,
            published_at: self.published_at.unwrap_or_default(),
            notes: self
                .body
                .filter(|b| !b.trim().is_empty())
                .unwrap_or_else(|| "No release notes available.".to_string()),
            size: asset.size,
        })
    }
}
