// SPDX-License-Identifier: CEPL-1.0
use prism_render::RenderConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct WindowCfg {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowCfg {
    fn default() -> Self {
        WindowCfg {
            width: 640,
            height: 480,
            title: "prism".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct LogCfg {
    /// `tracing` filter directive, e.g. `"prism_render=debug"`.
    pub filter: Option<String>,
}

/// Contents of `prism.toml`. Every section and key is optional.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct AppCfg {
    pub window: WindowCfg,
    pub render: RenderConfig,
    pub log: LogCfg,
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_render::VsyncMode;

    #[test]
    fn empty_file_is_all_defaults() {
        let cfg: AppCfg = toml::from_str("").unwrap();
        assert_eq!(cfg, AppCfg::default());
        assert_eq!(cfg.window.width, 640);
        assert_eq!(cfg.render.desired_image_count, 2);
        assert_eq!(cfg.render.frames_in_flight, 1);
        assert!(!cfg.render.fence_starts_signaled);
        assert!(cfg.render.render_pass);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg: AppCfg = toml::from_str(
            r#"
            [window]
            title = "demo"

            [render]
            vsync_mode = "fifo"
            frames_in_flight = 2
            clear_color = [1.0, 0.0, 0.0, 1.0]

            [log]
            filter = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.window.title, "demo");
        assert_eq!(cfg.window.height, 480);
        assert_eq!(cfg.render.vsync_mode, VsyncMode::Fifo);
        assert_eq!(cfg.render.frames_in_flight, 2);
        assert_eq!(cfg.render.clear_color, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(cfg.render.app_name, "prism");
        assert_eq!(cfg.log.filter.as_deref(), Some("debug"));
    }

    #[test]
    fn unknown_vsync_mode_is_rejected() {
        let r: Result<AppCfg, _> = toml::from_str("[render]\nvsync_mode = \"immediate\"\n");
        assert!(r.is_err());
    }
}
