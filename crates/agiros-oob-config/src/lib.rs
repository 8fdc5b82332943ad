//! Configuration management for the AGIROS out-of-band packaging tools
//!
//! A [`Config`] is assembled once at startup from built-in defaults, an
//! optional YAML file and environment variables (in that order of
//! precedence, lowest first), then passed around by reference. Nothing reads
//! the environment after that; [`Config::reload`] builds a fresh value.

use std::path::{Path, PathBuf};

use agiros_oob_core::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default configuration file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "agiros-oob.yaml";

/// Suffix of the queue metadata side file
pub const META_SUFFIX: &str = ".meta.json";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Directory holding one `<pkg>/tracks.yaml` per package
    pub release_dir: PathBuf,

    /// Directory holding package sources
    pub code_dir: PathBuf,

    /// Distro key looked up in track descriptors
    pub tracks_distro: String,

    /// ROS distro passed to bloom
    pub ros_distro: String,

    /// Distro used in computed upstream tags
    pub tag_distro: Option<String>,

    /// Ubuntu release used for Debian generation
    pub ubuntu_version: String,

    /// Preferred openEuler version for RPM generation
    pub openeuler_default: String,

    /// openEuler versions tried in order after the preferred one
    pub openeuler_fallback: Vec<String>,

    /// Base command of the metadata generator
    pub bloom_bin: String,

    /// Base command override for Debian generation
    pub bloom_bin_debian: Option<String>,

    /// Sync gbp.conf after Debian generation
    pub generate_gbp: bool,

    /// Sync gbp.conf before every queued Debian build
    pub sync_gbp_before_build: bool,

    /// git-buildpackage binary
    pub gbp_bin: String,

    /// Arguments passed to `gbp buildpackage`
    pub debian_build_args: Vec<String>,

    /// rpmbuild binary
    pub rpm_build_bin: String,

    /// Arguments passed to rpmbuild before the spec path
    pub rpm_build_args: Vec<String>,

    /// Wrapper script used for Debian builds when present
    pub debian_build_script: Option<PathBuf>,

    /// Wrapper script used for RPM builds when present
    pub rpm_build_script: Option<PathBuf>,

    /// Output directory handed to the Debian wrapper script
    pub deb_out_dir: PathBuf,

    /// Distro handed to the Debian wrapper script
    pub deb_distro: String,

    /// Release increment handed to the Debian wrapper script
    pub default_release_inc: String,

    /// Parallelism hint handed to the Debian wrapper script
    pub parallel: Option<String>,

    /// Git identity handed to the Debian wrapper script
    pub git_user_name: Option<String>,

    /// Git identity handed to the Debian wrapper script
    pub git_user_email: Option<String>,

    /// Queue line file
    pub queue_file: PathBuf,

    /// Append-only failure log
    pub fail_log: PathBuf,

    /// Output line marking an interactive prompt of the generator
    pub prompt_marker: String,

    /// Answer written to stdin when the prompt marker is seen
    pub prompt_response: String,

    /// Output line marker of a missing dependency rule
    pub missing_rule_marker: String,

    /// Print commands instead of running them
    pub dry_run: bool,

    /// File this configuration was read from
    #[serde(skip)]
    source: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            release_dir: PathBuf::from("ros2_release_dir"),
            code_dir: PathBuf::from("ros2_code_dir"),
            tracks_distro: "jazzy".to_string(),
            ros_distro: "loong".to_string(),
            tag_distro: None,
            ubuntu_version: "jammy".to_string(),
            openeuler_default: "24".to_string(),
            openeuler_fallback: vec!["22".to_string(), "23".to_string()],
            bloom_bin: "bloom-generate".to_string(),
            bloom_bin_debian: None,
            generate_gbp: false,
            sync_gbp_before_build: true,
            gbp_bin: "gbp".to_string(),
            debian_build_args: ["--git-ignore-branch", "--git-ignore-new", "-us", "-uc"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            rpm_build_bin: "rpmbuild".to_string(),
            rpm_build_args: vec!["-ba".to_string()],
            debian_build_script: None,
            rpm_build_script: None,
            deb_out_dir: PathBuf::from("/tmp/deb_out"),
            deb_distro: "loong".to_string(),
            default_release_inc: "1".to_string(),
            parallel: None,
            git_user_name: None,
            git_user_email: None,
            queue_file: PathBuf::from("build_queue.txt"),
            fail_log: PathBuf::from("fail.log"),
            prompt_marker: "Continue [Y/n]?".to_string(),
            prompt_response: "n".to_string(),
            missing_rule_marker: "No agirosdep rule for".to_string(),
            dry_run: false,
            source: None,
        }
    }
}

impl Config {
    /// Load configuration from defaults, an optional file and the process
    /// environment
    ///
    /// Without an explicit path, [`DEFAULT_CONFIG_FILE`] is used when it
    /// exists in the working directory.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                default.exists().then_some(default)
            }
        };
        Self::from_sources(path.as_deref(), |key| std::env::var(key).ok())
    }

    /// Build configuration from an optional file and an environment lookup
    pub fn from_sources<F>(path: Option<&Path>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(&lookup);
        config.expand_env_vars(&lookup)?;
        Ok(config)
    }

    /// Load configuration from a YAML file, without the environment overlay
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("Failed to read config file {path:?}: {e}")))?;

        let mut config: Config = if content.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(&content)
                .map_err(|e| Error::config(format!("Failed to parse YAML: {e}")))?
        };
        config.source = Some(path.to_path_buf());
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Build a new configuration from the same file and the current
    /// environment
    pub fn reload(&self) -> Result<Self> {
        Self::load(self.source.as_deref())
    }

    /// File this configuration was read from
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Queue metadata side file, next to the line file
    pub fn meta_file(&self) -> PathBuf {
        let mut name = self.queue_file.as_os_str().to_os_string();
        name.push(META_SUFFIX);
        PathBuf::from(name)
    }

    /// Copy of this configuration with dry-run enabled or disabled
    pub fn with_dry_run(&self, dry_run: bool) -> Self {
        Self { dry_run, ..self.clone() }
    }

    /// Validate that the configured directories exist
    pub fn validate(&self) -> Result<()> {
        if !self.release_dir.is_dir() {
            return Err(Error::config(format!(
                "Release directory does not exist: {:?}",
                self.release_dir
            )));
        }
        if !self.code_dir.is_dir() {
            return Err(Error::config(format!(
                "Code directory does not exist: {:?}",
                self.code_dir
            )));
        }
        if self.openeuler_default.trim().is_empty() {
            return Err(Error::config("openeuler_default cannot be empty"));
        }
        if self.prompt_marker.is_empty() || self.missing_rule_marker.is_empty() {
            return Err(Error::config("Output markers cannot be empty"));
        }
        Ok(())
    }

    /// External tools that cannot be found on `PATH`
    pub fn missing_tools(&self) -> Vec<String> {
        let mut tools = vec![self.gbp_bin.clone(), self.rpm_build_bin.clone()];
        tools.extend(first_word(&self.bloom_bin));
        if let Some(debian) = &self.bloom_bin_debian {
            tools.extend(first_word(debian));
        }
        tools.dedup();
        tools.into_iter().filter(|tool| which::which(tool).is_err()).collect()
    }

    /// Overlay recognised environment variables
    fn apply_env<F>(&mut self, lookup: &F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("AGIROS_RELEASE_DIR") {
            self.release_dir = PathBuf::from(v);
        }
        if let Some(v) = get("AGIROS_CODE_DIR") {
            self.code_dir = PathBuf::from(v);
        }
        if let Some(v) = get("AGIROS_TRACKS_DISTRO").or_else(|| get("OOB_TRACKS_DISTRO")) {
            self.tracks_distro = v;
        }
        if let Some(v) = get("AGIROS_ROS_DISTRO") {
            self.ros_distro = v;
        }
        if let Some(v) = get("AGIROS_DISTRO")
            .or_else(|| get("AGIROS_ROS_DISTRO"))
            .or_else(|| get("ROS_DISTRO"))
        {
            self.tag_distro = Some(v);
        }
        if let Some(v) = get("AGIROS_UBUNTU_DEFAULT") {
            self.ubuntu_version = v;
        }
        if let Some(v) = get("AGIROS_OE_DEFAULT") {
            self.openeuler_default = v;
        }
        if let Some(v) = get("AGIROS_OE_FALLBACK") {
            self.openeuler_fallback = split_list(&v);
        }
        if let Some(v) = get("AGIROS_BLOOM_BIN") {
            self.bloom_bin = v;
        }
        if let Some(v) = get("AGIROS_BLOOM_BIN_DEBIAN") {
            self.bloom_bin_debian = Some(v);
        }
        if let Some(v) = get("AGIROS_GENERATE_GBP") {
            self.generate_gbp = parse_bool(&v);
        }
        if let Some(v) = get("AGIROS_RPMBUILD_BIN") {
            self.rpm_build_bin = v;
        }
        if let Some(v) = get("AGIROS_QUEUE_FILE") {
            self.queue_file = PathBuf::from(v);
        }
        if let Some(v) = get("AGIROS_FAIL_LOG") {
            self.fail_log = PathBuf::from(v);
        }
        if let Some(v) = get("DEB_OUT") {
            self.deb_out_dir = PathBuf::from(v);
        }
        if let Some(v) = get("DISTRO") {
            self.deb_distro = v;
        }
        if let Some(v) = get("DEFAULT_REL_INC") {
            self.default_release_inc = v;
        }
        if let Some(v) = get("PARALLEL") {
            self.parallel = Some(v);
        }
        if let Some(v) = get("GIT_USER_NAME") {
            self.git_user_name = Some(v);
        }
        if let Some(v) = get("GIT_USER_EMAIL") {
            self.git_user_email = Some(v);
        }
        if let Some(v) = get("AGIROS_DRYRUN") {
            self.dry_run = parse_bool(&v);
        }
    }

    /// Expand environment variables in paths
    fn expand_env_vars<F>(&mut self, lookup: &F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.release_dir = expand_path(&self.release_dir, lookup)?;
        self.code_dir = expand_path(&self.code_dir, lookup)?;
        self.deb_out_dir = expand_path(&self.deb_out_dir, lookup)?;
        self.queue_file = expand_path(&self.queue_file, lookup)?;
        self.fail_log = expand_path(&self.fail_log, lookup)?;
        if let Some(script) = self.debian_build_script.take() {
            self.debian_build_script = Some(expand_path(&script, lookup)?);
        }
        if let Some(script) = self.rpm_build_script.take() {
            self.rpm_build_script = Some(expand_path(&script, lookup)?);
        }
        Ok(())
    }
}

/// Expand `${VAR}`, `$VAR` and a leading `~` in a path
fn expand_path<F>(path: &Path, lookup: &F) -> Result<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    let path_str = path.to_string_lossy();
    let env_var_re = Regex::new(r"\$\{([^}]+)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
        .map_err(|e| Error::config(format!("Invalid expansion pattern: {e}")))?;

    let mut result = path_str.to_string();
    for cap in env_var_re.captures_iter(&path_str) {
        let Some(var_name) = cap.get(1).or_else(|| cap.get(2)).map(|m| m.as_str()) else {
            continue;
        };
        let var_value = lookup(var_name)
            .ok_or_else(|| Error::config(format!("Environment variable not found: {var_name}")))?;

        result = result.replace(&cap[0], &var_value);
    }

    if result == "~" || result.starts_with("~/") {
        let home =
            lookup("HOME").ok_or_else(|| Error::config("Cannot expand `~`: HOME is not set"))?;
        result = format!("{home}{}", &result[1..]);
    }

    Ok(PathBuf::from(result))
}

/// Interpret an environment flag
pub fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "y" | "on")
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn first_word(command: &str) -> Option<String> {
    command.split_whitespace().next().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use tempfile::TempDir;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_sources(None, env(&[])).unwrap();
        assert_eq!(config.tracks_distro, "jazzy");
        assert_eq!(config.ros_distro, "loong");
        assert_eq!(config.openeuler_default, "24");
        assert_eq!(config.openeuler_fallback, vec!["22", "23"]);
        assert_eq!(config.tag_distro, None);
        assert_eq!(config.meta_file(), PathBuf::from("build_queue.txt.meta.json"));
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::from_sources(
            None,
            env(&[
                ("AGIROS_CODE_DIR", "/srv/code"),
                ("AGIROS_OE_FALLBACK", "22, 23 20.03"),
                ("AGIROS_GENERATE_GBP", "yes"),
                ("ROS_DISTRO", "humble"),
                ("AGIROS_QUEUE_FILE", "/tmp/q.txt"),
            ]),
        )
        .unwrap();
        assert_eq!(config.code_dir, PathBuf::from("/srv/code"));
        assert_eq!(config.openeuler_fallback, vec!["22", "23", "20.03"]);
        assert!(config.generate_gbp);
        assert_eq!(config.tag_distro.as_deref(), Some("humble"));
        assert_eq!(config.meta_file(), PathBuf::from("/tmp/q.txt.meta.json"));
    }

    #[test]
    fn test_tag_distro_priority() {
        let config = Config::from_sources(
            None,
            env(&[("AGIROS_DISTRO", "pixiu"), ("AGIROS_ROS_DISTRO", "loong"), ("ROS_DISTRO", "jazzy")]),
        )
        .unwrap();
        assert_eq!(config.tag_distro.as_deref(), Some("pixiu"));
        assert_eq!(config.ros_distro, "loong");
    }

    #[test]
    fn test_expand_path() {
        let lookup = env(&[("TEST_VAR", "/test/path"), ("HOME", "/home/builder")]);

        let expanded = expand_path(Path::new("${TEST_VAR}/sub"), &lookup).unwrap();
        assert_eq!(expanded, PathBuf::from("/test/path/sub"));

        let expanded = expand_path(Path::new("$TEST_VAR/sub"), &lookup).unwrap();
        assert_eq!(expanded, PathBuf::from("/test/path/sub"));

        let expanded = expand_path(Path::new("~/queue.txt"), &lookup).unwrap();
        assert_eq!(expanded, PathBuf::from("/home/builder/queue.txt"));

        assert!(expand_path(Path::new("$MISSING/x"), &lookup).is_err());
    }

    #[test]
    fn test_file_then_env() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("agiros-oob.yaml");
        std::fs::write(
            &path,
            "code_dir: ${SRC_ROOT}/code\nubuntu_version: noble\nopeneuler_default: \"22\"\n",
        )
        .unwrap();

        let config =
            Config::from_sources(Some(&path), env(&[("SRC_ROOT", "/data"), ("AGIROS_OE_DEFAULT", "23")]))
                .unwrap();
        assert_eq!(config.code_dir, PathBuf::from("/data/code"));
        assert_eq!(config.ubuntu_version, "noble");
        assert_eq!(config.openeuler_default, "23");
        assert_eq!(config.source(), Some(path.as_path()));
    }

    #[test]
    fn test_config_validation() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.release_dir = temp_dir.path().join("release");
        config.code_dir = temp_dir.path().join("code");
        assert!(config.validate().is_err());

        std::fs::create_dir_all(&config.release_dir).unwrap();
        std::fs::create_dir_all(&config.code_dir).unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("On"));
        assert!(parse_bool("1"));
        assert!(!parse_bool("0"));
        assert!(!parse_bool("nope"));
    }
}
