// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Release metadata from the GitHub releases API.
//!
//! See also <https://docs.github.com/en/rest/releases/releases>.

use {
    crate::{error::ToolchainError, ToolchainSettings},
    log::{info, warn},
    reqwest::header::ACCEPT,
    serde::Deserialize,
    std::{fs::File, path::Path},
    url::Url,
};

/// A downloadable artifact attached to a release.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
}

/// Metadata describing a published release.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Release {
    #[serde(default)]
    pub tag_name: Option<String>,
    /// Attached assets.
    ///
    /// [None] if the response did not define an `assets` list at all.
    #[serde(default)]
    pub assets: Option<Vec<ReleaseAsset>>,
}

impl Release {
    /// Obtain the assets list, failing if the release metadata lacked one.
    pub fn require_assets(&self) -> Result<&[ReleaseAsset], ToolchainError> {
        self.assets
            .as_deref()
            .ok_or_else(|| ToolchainError::MetadataFetch("release data does not contain assets".into()))
    }
}

/// Select the release asset with the given name prefix and suffix.
///
/// If several assets match, the first in listing order is used.
pub fn select_asset<'a>(
    assets: &'a [ReleaseAsset],
    prefix: &str,
    suffix: &str,
) -> Result<&'a ReleaseAsset, ToolchainError> {
    let mut candidates = assets
        .iter()
        .filter(|asset| asset.name.starts_with(prefix) && asset.name.ends_with(suffix));

    let asset = candidates
        .next()
        .ok_or_else(|| ToolchainError::NoMatchingAsset(suffix.to_string()))?;

    let ignored = candidates.map(|a| a.name.as_str()).collect::<Vec<_>>();
    if !ignored.is_empty() {
        warn!(
            "multiple assets match {}*{}; using {} and ignoring {}",
            prefix,
            suffix,
            asset.name,
            ignored.join(", ")
        );
    }

    Ok(asset)
}

/// A provider of release metadata and release asset content.
pub trait ReleaseSource {
    /// Fetch metadata for the latest release.
    fn latest_release(&self) -> Result<Release, ToolchainError>;

    /// Write the content of a release asset to the given path.
    fn download_asset(&self, asset: &ReleaseAsset, dest_path: &Path) -> Result<(), ToolchainError>;
}

/// Obtain an HTTP client configured from toolchain settings.
pub fn get_http_client(
    settings: &ToolchainSettings,
) -> reqwest::Result<reqwest::blocking::Client> {
    let mut builder = reqwest::blocking::ClientBuilder::new().user_agent(&settings.user_agent);

    if let Some(timeout) = settings.http_timeout {
        builder = builder.timeout(timeout);
    }

    builder.build()
}

/// [ReleaseSource] backed by the GitHub releases API.
#[derive(Clone, Debug)]
pub struct GitHubReleases {
    client: reqwest::blocking::Client,
    latest_release_url: String,
}

impl GitHubReleases {
    pub fn new(settings: &ToolchainSettings) -> Result<Self, ToolchainError> {
        let client = get_http_client(settings).map_err(|e| {
            ToolchainError::MetadataFetch(format!("constructing HTTP client: {}", e))
        })?;

        Ok(Self {
            client,
            latest_release_url: settings.release_url.clone(),
        })
    }
}

impl ReleaseSource for GitHubReleases {
    fn latest_release(&self) -> Result<Release, ToolchainError> {
        let url = Url::parse(&self.latest_release_url).map_err(|e| {
            ToolchainError::MetadataFetch(format!("{}: {}", self.latest_release_url, e))
        })?;

        info!("fetching latest release information from {}", url);

        let response = self
            .client
            .get(url.clone())
            .header(ACCEPT, "application/vnd.github+json")
            .send()
            .and_then(|response| response.error_for_status())
            .map_err(|e| ToolchainError::MetadataFetch(format!("{}: {}", url, e)))?;

        response
            .json::<Release>()
            .map_err(|e| ToolchainError::MetadataFetch(format!("decoding {}: {}", url, e)))
    }

    fn download_asset(&self, asset: &ReleaseAsset, dest_path: &Path) -> Result<(), ToolchainError> {
        let download_error = |message: String| ToolchainError::Download {
            url: asset.browser_download_url.clone(),
            message,
        };

        info!("downloading {}", asset.name);

        let mut response = self
            .client
            .get(&asset.browser_download_url)
            .send()
            .and_then(|response| response.error_for_status())
            .map_err(|e| download_error(e.to_string()))?;

        let mut fh = File::create(dest_path).map_err(ToolchainError::with_path(dest_path))?;
        let size = response
            .copy_to(&mut fh)
            .map_err(|e| download_error(e.to_string()))?;

        info!("downloaded {} bytes to {}", size, dest_path.display());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {super::*, indoc::indoc};

    const RELEASE_JSON: &str = indoc! {r#"
        {
          "url": "https://api.github.com/repos/indygreg/apple-platform-rs/releases/1",
          "tag_name": "apple-codesign/0.22.0",
          "name": "apple-codesign 0.22.0",
          "draft": false,
          "assets": [
            {
              "name": "apple-codesign-0.22.0-aarch64-apple-darwin.tar.gz",
              "size": 7340032,
              "browser_download_url": "https://github.com/indygreg/apple-platform-rs/releases/download/apple-codesign%2F0.22.0/apple-codesign-0.22.0-aarch64-apple-darwin.tar.gz"
            },
            {
              "name": "apple-codesign-0.22.0-x86_64-pc-windows-msvc.zip",
              "size": 6291456,
              "browser_download_url": "https://github.com/indygreg/apple-platform-rs/releases/download/apple-codesign%2F0.22.0/apple-codesign-0.22.0-x86_64-pc-windows-msvc.zip"
            },
            {
              "name": "apple-codesign-0.22.0-x86_64-unknown-linux-musl.tar.gz",
              "size": 8388608,
              "browser_download_url": "https://github.com/indygreg/apple-platform-rs/releases/download/apple-codesign%2F0.22.0/apple-codesign-0.22.0-x86_64-unknown-linux-musl.tar.gz"
            }
          ]
        }
    "#};

    fn asset(name: &str) -> ReleaseAsset {
        ReleaseAsset {
            name: name.to_string(),
            browser_download_url: format!("https://example.com/{}", name),
        }
    }

    #[test]
    fn parse_release() -> Result<(), ToolchainError> {
        let release = serde_json::from_str::<Release>(RELEASE_JSON)
            .map_err(|e| ToolchainError::MetadataFetch(e.to_string()))?;

        assert_eq!(release.tag_name.as_deref(), Some("apple-codesign/0.22.0"));

        let asset = select_asset(
            release.require_assets()?,
            "apple-codesign-",
            "-x86_64-unknown-linux-musl.tar.gz",
        )?;
        assert_eq!(
            asset.name,
            "apple-codesign-0.22.0-x86_64-unknown-linux-musl.tar.gz"
        );
        assert!(asset.browser_download_url.ends_with(&asset.name));

        Ok(())
    }

    #[test]
    fn missing_assets() {
        let release = serde_json::from_str::<Release>(r#"{"message": "Not Found"}"#).unwrap();

        assert!(matches!(
            release.require_assets(),
            Err(ToolchainError::MetadataFetch(_))
        ));
    }

    #[test]
    fn select_requires_prefix_and_suffix() {
        let assets = vec![
            asset("rcodesign-0.22.0-x86_64-unknown-linux-musl.tar.gz"),
            asset("apple-codesign-0.22.0-x86_64-unknown-linux-musl.tar.gz.sha256"),
            asset("apple-codesign-0.22.0-aarch64-unknown-linux-musl.tar.gz"),
        ];

        assert!(matches!(
            select_asset(&assets, "apple-codesign-", "-x86_64-unknown-linux-musl.tar.gz"),
            Err(ToolchainError::NoMatchingAsset(_))
        ));
        assert!(matches!(
            select_asset(&[], "apple-codesign-", "-x86_64-unknown-linux-musl.tar.gz"),
            Err(ToolchainError::NoMatchingAsset(_))
        ));
    }

    #[test]
    fn select_first_of_ambiguous() -> Result<(), ToolchainError> {
        let assets = vec![
            asset("apple-codesign-0.22.0-x86_64-apple-darwin.tar.gz"),
            asset("apple-codesign-0.21.0-x86_64-apple-darwin.tar.gz"),
        ];

        let selected = select_asset(&assets, "apple-codesign-", "-x86_64-apple-darwin.tar.gz")?;
        assert_eq!(selected, &assets[0]);

        Ok(())
    }
}
