use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::aggregate::DEFAULT_MAX_VISIBLE;
use crate::codec::ViewZone;
use crate::layout::{
  GridMetrics,
  SpanPolicy
};

const DEFAULTS: [(&str, &str); 7] = [
  ("data.location", "~/.almanac"),
  ("default.command", "month"),
  ("color", "on"),
  ("calendar.row_height", "64"),
  ("calendar.min_height", "20"),
  ("calendar.max_visible", "3"),
  ("calendar.span_policy", "overflow")
];

#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Self::defaults();

    let rc = resolve_rc_path(rc_override)?;
    if let Some(path) = rc {
      info!(almanacrc = %path.display(), "loading almanacrc");
      cfg.load_file(&path)?;
    } else {
      warn!(
        "no almanacrc found; using \
         defaults"
      );
    }

    Ok(cfg)
  }

  /// Built-in defaults only, no rc file.
  #[must_use]
  pub fn defaults() -> Self {
    Self {
      map:          DEFAULTS
        .iter()
        .map(|(k, v)| {
          (k.to_string(), v.to_string())
        })
        .collect(),
      loaded_files: vec![]
    }
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  pub fn get_bool(
    &self,
    key: &str
  ) -> Option<bool> {
    self
      .map
      .get(key)
      .map(|v| parse_bool(v))
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;
    self.loaded_files.push(path.clone());

    let base_dir = path
      .parent()
      .map(Path::to_path_buf)
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (line_num, raw_line) in
      text.lines().enumerate()
    {
      let line = raw_line
        .split_once('#')
        .map_or(raw_line, |(before, _)| {
          before
        })
        .trim();
      if line.is_empty() {
        continue;
      }

      if let Some(include_rest) =
        line.strip_prefix("include ")
      {
        let include_path =
          resolve_include_path(
            &base_dir,
            include_rest.trim()
          )?;
        debug!(
          file = %path.display(),
          include = %include_path.display(),
          line = line_num + 1,
          "processing include"
        );

        if include_path == path {
          warn!(include = %include_path.display(), "file includes itself; skipping");
        } else if include_path.exists() {
          self.load_file(&include_path)?;
        } else {
          warn!(include = %include_path.display(), "include file does not exist; skipping");
        }
        continue;
      }

      let (k, v) = line
        .split_once('=')
        .ok_or_else(|| {
          anyhow!(
            "invalid config line \
             {}:{}: {}",
            path.display(),
            line_num + 1,
            raw_line
          )
        })?;

      let key = k.trim().to_string();
      let value = v.trim().to_string();
      trace!(key = %key, value = %value, "loaded config key");
      self.map.insert(key, value);
    }

    Ok(())
  }
}

/// Typed view of the `calendar.*` and
/// `timezone.*` keys.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewSettings {
  pub zone:        ViewZone,
  pub metrics:     GridMetrics,
  pub max_visible: usize
}

impl Default for ViewSettings {
  fn default() -> Self {
    Self {
      zone:        ViewZone::System,
      metrics:     GridMetrics::default(),
      max_visible: DEFAULT_MAX_VISIBLE
    }
  }
}

impl ViewSettings {
  #[tracing::instrument(skip(cfg))]
  pub fn from_config(
    cfg: &Config
  ) -> anyhow::Result<Self> {
    let defaults = Self::default();

    let zone = match cfg
      .get("timezone.offset")
      .filter(|raw| {
        !raw.trim().is_empty()
          && !raw
            .trim()
            .eq_ignore_ascii_case("local")
      }) {
      | Some(raw) => {
        ViewZone::fixed(&raw)
          .context("timezone.offset")?
      }
      | None => defaults.zone
    };

    let row_height_px = parse_number(
      cfg,
      "calendar.row_height",
      defaults.metrics.row_height_px
    )?;
    if row_height_px <= 0.0 {
      return Err(anyhow!(
        "calendar.row_height must be \
         positive, got {row_height_px}"
      ));
    }

    let min_height_px = parse_number(
      cfg,
      "calendar.min_height",
      defaults.metrics.min_height_px
    )?;
    if min_height_px < 0.0 {
      return Err(anyhow!(
        "calendar.min_height must not \
         be negative, got {min_height_px}"
      ));
    }

    let span_policy = match cfg
      .get("calendar.span_policy")
    {
      | Some(raw) => {
        raw
          .parse::<SpanPolicy>()
          .context("calendar.span_policy")?
      }
      | None => {
        defaults.metrics.span_policy
      }
    };

    let max_visible = match cfg
      .get("calendar.max_visible")
    {
      | Some(raw) => {
        raw.trim().parse::<usize>().with_context(
          || {
            format!(
              "calendar.max_visible must \
               be a whole number, got \
               '{raw}'"
            )
          }
        )?
      }
      | None => defaults.max_visible
    };

    let settings = Self {
      zone,
      metrics: GridMetrics {
        row_height_px,
        min_height_px,
        span_policy
      },
      max_visible
    };
    debug!(?settings, "resolved view settings");
    Ok(settings)
  }
}

fn parse_number(
  cfg: &Config,
  key: &str,
  fallback: f64
) -> anyhow::Result<f64> {
  let Some(raw) = cfg.get(key) else {
    return Ok(fallback);
  };
  let value =
    raw.trim().parse::<f64>().with_context(
      || {
        format!(
          "{key} must be a number, got \
           '{raw}'"
        )
      }
    )?;
  if !value.is_finite() {
    return Err(anyhow!(
      "{key} must be finite, got '{raw}'"
    ));
  }
  Ok(value)
}

#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = if let Some(path) =
    override_dir
  {
    path.to_path_buf()
  } else if let Some(cfg_value) =
    cfg.get("data.location")
  {
    expand_tilde(Path::new(&cfg_value))
  } else {
    default_data_dir()?
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_rc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(rc_env) =
    std::env::var("ALMANACRC")
  {
    if rc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      rc_env
    )));
  }

  let Some(home) = dirs::home_dir()
  else {
    warn!(
      "cannot determine home \
       directory; skipping almanacrc"
    );
    return Ok(None);
  };
  let candidate = home.join(".almanacrc");
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn default_data_dir()
-> anyhow::Result<PathBuf> {
  let home = dirs::home_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine home \
         directory"
      )
    })?;
  Ok(home.join(".almanac"))
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.trim().is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let expanded =
    expand_tilde(Path::new(include));
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

fn parse_bool(s: &str) -> bool {
  matches!(
    s.trim()
      .to_ascii_lowercase()
      .as_str(),
    "1" | "y" | "yes" | "on" | "true"
  )
}
