//! Client identity randomization.
//!
//! A `Fingerprint` is drawn from curated pools so that every attribute is
//! consistent with the platform: mobile platforms get mobile screens, Apple
//! GPUs only show up on Apple platforms, desktops report no touch points.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

/// Broad device class; decides which resolution pool applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    Desktop,
    Mobile,
}

/// A platform entry: `navigator.platform`, device class, UA and GPU pools.
struct PlatformProfile {
    platform: &'static str,
    class: DeviceClass,
    user_agents: &'static [&'static str],
    gpus: &'static [(&'static str, &'static str)],
    touch_points: &'static [u8],
}

const DESKTOP_RESOLUTIONS: &[(u32, u32)] = &[
    (1920, 1080),
    (1366, 768),
    (1536, 864),
    (1440, 900),
    (1280, 720),
    (1600, 900),
    (2560, 1440),
];

const MOBILE_RESOLUTIONS: &[(u32, u32)] = &[
    (390, 844),
    (393, 873),
    (412, 915),
    (414, 896),
    (375, 667),
    (360, 800),
];

const LOCALES: &[&[&str]] = &[
    &["fr-FR", "fr", "en-US", "en"],
    &["fr-FR", "fr"],
    &["en-US", "en"],
    &["es-ES", "es", "en"],
    &["de-DE", "de", "en"],
];

const TIMEZONES: &[&str] = &[
    "Europe/Paris",
    "Europe/London",
    "Europe/Berlin",
    "Europe/Madrid",
];

const PC_GPUS: &[(&str, &str)] = &[
    ("Intel Inc.", "Intel Iris OpenGL Engine"),
    ("NVIDIA Corporation", "NVIDIA GeForce GTX 1060/PCIe/SSE2"),
    ("AMD", "AMD Radeon RX 580 OpenGL Engine"),
];

const APPLE_GPUS: &[(&str, &str)] = &[
    ("Apple Inc.", "Apple M1"),
    ("Apple Inc.", "Apple M2"),
    ("Intel Inc.", "Intel Iris Plus Graphics OpenGL Engine"),
];

const IOS_GPUS: &[(&str, &str)] = &[("Apple Inc.", "Apple GPU")];

const ANDROID_GPUS: &[(&str, &str)] = &[
    ("Qualcomm", "Adreno (TM) 640"),
    ("ARM", "Mali-G78"),
];

const PLATFORMS: &[PlatformProfile] = &[
    PlatformProfile {
        platform: "Win32",
        class: DeviceClass::Desktop,
        user_agents: &[
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
        ],
        gpus: PC_GPUS,
        touch_points: &[0],
    },
    PlatformProfile {
        platform: "MacIntel",
        class: DeviceClass::Desktop,
        user_agents: &[
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
        ],
        gpus: APPLE_GPUS,
        touch_points: &[0],
    },
    PlatformProfile {
        platform: "Linux x86_64",
        class: DeviceClass::Desktop,
        user_agents: &[
            "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        ],
        gpus: PC_GPUS,
        touch_points: &[0],
    },
    PlatformProfile {
        platform: "iPhone",
        class: DeviceClass::Mobile,
        user_agents: &[
            "Mozilla/5.0 (iPhone; CPU iPhone OS 17_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Mobile/15E148 Safari/604.1",
        ],
        gpus: IOS_GPUS,
        touch_points: &[5],
    },
    PlatformProfile {
        platform: "Linux armv81",
        class: DeviceClass::Mobile,
        user_agents: &[
            "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36",
            "Mozilla/5.0 (Linux; Android 13; SM-S911B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36",
        ],
        gpus: ANDROID_GPUS,
        touch_points: &[5, 10],
    },
];

/// An immutable client identity. Rotate by generating a new one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fingerprint {
    screen_width: u32,
    screen_height: u32,
    color_depth: u8,
    languages: Vec<String>,
    timezone: String,
    platform: String,
    device_class: DeviceClass,
    user_agent: String,
    webgl_vendor: String,
    webgl_renderer: String,
    hardware_concurrency: u8,
    device_memory_gb: u8,
    max_touch_points: u8,
}

impl Fingerprint {
    pub fn resolution(&self) -> (u32, u32) {
        (self.screen_width, self.screen_height)
    }

    pub fn color_depth(&self) -> u8 {
        self.color_depth
    }

    /// Primary locale, e.g. `fr-FR`.
    pub fn locale(&self) -> &str {
        self.languages.first().map(String::as_str).unwrap_or("en-US")
    }

    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    pub fn timezone(&self) -> &str {
        &self.timezone
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    pub fn device_class(&self) -> DeviceClass {
        self.device_class
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn webgl_vendor(&self) -> &str {
        &self.webgl_vendor
    }

    pub fn webgl_renderer(&self) -> &str {
        &self.webgl_renderer
    }

    pub fn hardware_concurrency(&self) -> u8 {
        self.hardware_concurrency
    }

    pub fn device_memory_gb(&self) -> u8 {
        self.device_memory_gb
    }

    pub fn max_touch_points(&self) -> u8 {
        self.max_touch_points
    }

    /// `Accept-Language` header value with descending q-weights.
    pub fn accept_language(&self) -> String {
        self.languages
            .iter()
            .enumerate()
            .map(|(i, lang)| {
                if i == 0 {
                    lang.clone()
                } else {
                    let q = (10 - i.min(9)) as f32 / 10.0;
                    format!("{lang};q={q:.1}")
                }
            })
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Generate a fingerprint with the thread-local RNG.
pub fn generate() -> Fingerprint {
    generate_with(&mut rand::thread_rng())
}

/// Generate a fingerprint from a caller-supplied RNG.
pub fn generate_with<R: Rng + ?Sized>(rng: &mut R) -> Fingerprint {
    let profile = &PLATFORMS[rng.gen_range(0..PLATFORMS.len())];

    let resolutions = match profile.class {
        DeviceClass::Desktop => DESKTOP_RESOLUTIONS,
        DeviceClass::Mobile => MOBILE_RESOLUTIONS,
    };
    let (w, h) = resolutions[rng.gen_range(0..resolutions.len())];
    let (vendor, renderer) = profile.gpus[rng.gen_range(0..profile.gpus.len())];
    let user_agent = profile.user_agents[rng.gen_range(0..profile.user_agents.len())];
    let languages = LOCALES[rng.gen_range(0..LOCALES.len())];

    let cores: &[u8] = match profile.class {
        DeviceClass::Desktop => &[4, 6, 8, 12, 16],
        DeviceClass::Mobile => &[6, 8],
    };
    let memory: &[u8] = match profile.class {
        DeviceClass::Desktop => &[8, 16, 32],
        DeviceClass::Mobile => &[4, 6, 8],
    };

    Fingerprint {
        screen_width: w,
        screen_height: h,
        color_depth: *[24u8, 30, 32].choose(rng).unwrap_or(&24),
        languages: languages.iter().map(|s| s.to_string()).collect(),
        timezone: TIMEZONES[rng.gen_range(0..TIMEZONES.len())].to_string(),
        platform: profile.platform.to_string(),
        device_class: profile.class,
        user_agent: user_agent.to_string(),
        webgl_vendor: vendor.to_string(),
        webgl_renderer: renderer.to_string(),
        hardware_concurrency: *cores.choose(rng).unwrap_or(&8),
        device_memory_gb: *memory.choose(rng).unwrap_or(&8),
        max_touch_points: *profile.touch_points.choose(rng).unwrap_or(&0),
    }
}
