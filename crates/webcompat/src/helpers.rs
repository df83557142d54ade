//! Site-family fingerprint checks shared by several probes.
//!
//! Each helper reduces one recurring breakage pattern to a boolean the
//! step interpreter can act on: a tap-latency polyfill swallowing
//! taps, an unsupported-browser banner, a video player that refuses to
//! start, a layout-breaking scrollbar, a blank rendering area.

use std::time::Duration;

use tokio::time::Instant;

use crate::client::{Element, Session};
use crate::locator::Locator;
use crate::result::{WebcompatError, WebcompatResult};
use crate::wait::{NavigateOptions, WaitOptions};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Per-pixel channel tolerance before an area stops counting as one
/// solid color. Compression artifacts stay under this.
pub const SOLID_COLOR_TOLERANCE: u8 = 8;

/// How long a tap gets to surface as a click event.
pub const FASTCLICK_TAP_WAIT: Duration = Duration::from_secs(2);

/// How long the unsupported-browser banner gets to render.
pub const ENTRATA_BANNER_WAIT: Duration = Duration::from_secs(5);

/// How long a nicochannel-family player gets to produce a video element.
pub const NICOCHANNEL_PLAYER_WAIT: Duration = Duration::from_secs(30);

/// How long playback gets to advance past the first frame.
pub const VIDEO_PLAYBACK_WAIT: Duration = Duration::from_secs(10);

/// Banner text shared by Entrata-built property portals.
pub const ENTRATA_BANNER_TEXT: &str = "browser is not supported";

/// Scrollable strip on Future-plc mastheads.
pub const TRENDING_STRIP_SELECTOR: &str = ".trending__list-wrapper, ul.trending__list";

/// Counts click events per document, marking the ones the FastClick
/// polyfill synthesized. FastClick stamps `forwardedTouchEvent` on its
/// clicks; a capture-phase listener on `window` sees every variant.
/// Must be installed as a preload so it observes page scripts from the
/// first event on.
pub const FASTCLICK_MARKER_SCRIPT: &str = "\
    window.__tapDelivery = { clicks: 0, forwarded: 0 }; \
    window.addEventListener('click', (event) => { \
        window.__tapDelivery.clicks += 1; \
        if (event.forwardedTouchEvent) { window.__tapDelivery.forwarded += 1; } \
    }, true);";

const TAP_STATE_SCRIPT: &str = "return window.__tapDelivery || null;";

// =============================================================================
// FASTCLICK
// =============================================================================

/// What happened to a synthesized tap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TapDelivery {
    /// Click events observed after the tap.
    pub clicks: u64,
    /// Click events carrying the FastClick forwarding mark.
    pub forwarded: u64,
}

impl TapDelivery {
    /// The tap reached the page as a plain native click.
    #[must_use]
    pub const fn native(&self) -> bool {
        self.clicks > 0 && self.forwarded == 0
    }

    /// FastClick intercepted the touch and re-dispatched it.
    #[must_use]
    pub const fn through_fastclick(&self) -> bool {
        self.forwarded > 0
    }

    /// No click event surfaced at all.
    #[must_use]
    pub const fn swallowed(&self) -> bool {
        self.clicks == 0
    }
}

/// Install the tap marker. Must run before the navigation whose
/// document is tapped.
pub async fn prime_fastclick_detection(session: &Session) -> WebcompatResult<()> {
    session.make_preload_script(FASTCLICK_MARKER_SCRIPT).await
}

/// Tap an element with touch input and report how the click surfaced.
///
/// Fails if the marker preload is not installed in the document.
pub async fn tap_delivery(
    session: &Session,
    element: &Element,
    wait: Duration,
) -> WebcompatResult<TapDelivery> {
    session.apz_click(element).await?;
    let deadline = Instant::now() + wait;
    loop {
        let state = session.execute_script(TAP_STATE_SCRIPT, vec![]).await?;
        if state.is_null() {
            return Err(WebcompatError::assertion(
                "tap marker is not installed; prime fastclick detection before navigating",
            ));
        }
        let delivery = TapDelivery {
            clicks: state["clicks"].as_u64().unwrap_or(0),
            forwarded: state["forwarded"].as_u64().unwrap_or(0),
        };
        if !delivery.swallowed() || Instant::now() >= deadline {
            return Ok(delivery);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// Whether the FastClick polyfill is still interposing on taps to the
/// element, either re-dispatching them or eating them outright.
pub async fn fastclick_intercepting(
    session: &Session,
    element: &Element,
) -> WebcompatResult<bool> {
    let delivery = tap_delivery(session, element, FASTCLICK_TAP_WAIT).await?;
    Ok(!delivery.native())
}

// =============================================================================
// SITE FAMILIES
// =============================================================================

/// Whether the Entrata unsupported-browser banner stayed off screen in
/// the current document.
pub async fn entrata_banner_hidden(session: &Session, wait: Duration) -> WebcompatResult<bool> {
    let options = WaitOptions::new().timeout(wait).displayed(true);
    match session
        .await_locator(&Locator::text(ENTRATA_BANNER_TEXT), &options)
        .await
    {
        Ok(_) => Ok(false),
        Err(WebcompatError::NoSuchElement { .. }) => Ok(true),
        Err(e) => Err(e),
    }
}

/// Navigate a nicochannel-family page and report whether its video
/// starts playing rather than surfacing a decode error.
pub async fn nicochannel_site_works(
    session: &Session,
    url: &str,
    playback_wait: Duration,
) -> WebcompatResult<bool> {
    session.navigate(url, &NavigateOptions::new()).await?;
    let video = session
        .await_css(
            "video",
            &WaitOptions::new().timeout(NICOCHANNEL_PLAYER_WAIT),
        )
        .await?;
    video_plays(session, &video, playback_wait).await
}

/// Start playback on a media element and poll until the clock advances
/// or the element reports a decode error. A stall until the deadline
/// counts as not playing.
pub async fn video_plays(
    session: &Session,
    video: &Element,
    wait: Duration,
) -> WebcompatResult<bool> {
    session
        .execute_script(
            "const v = arguments[0]; \
             v.muted = true; \
             const p = v.play(); \
             if (p && p.catch) { p.catch(() => {}); }",
            vec![video.to_wire()],
        )
        .await?;
    let deadline = Instant::now() + wait;
    loop {
        let state = session
            .execute_script(
                "const v = arguments[0]; \
                 return { error: v.error ? v.error.code : null, time: v.currentTime };",
                vec![video.to_wire()],
            )
            .await?;
        if !state["error"].is_null() {
            return Ok(false);
        }
        if state["time"].as_f64().unwrap_or(0.0) > 0.1 {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
}

/// Whether the Future-plc trending strip grew a horizontal scrollbar.
/// Only meaningful where scrollbars take up layout space, which is why
/// callers gate on the visible-scrollbars capability.
pub async fn trending_strip_overflows(
    session: &Session,
    wait: Duration,
) -> WebcompatResult<bool> {
    let strip = session
        .await_css(TRENDING_STRIP_SELECTOR, &WaitOptions::new().timeout(wait))
        .await?;
    let value = session
        .execute_script(
            "const el = arguments[0]; return el.offsetHeight - el.clientHeight > 0;",
            vec![strip.to_wire()],
        )
        .await?;
    Ok(value.as_bool().unwrap_or(false))
}

// =============================================================================
// PIXELS
// =============================================================================

/// Screenshot an element and test whether it renders as one solid
/// color.
pub async fn element_is_one_solid_color(
    session: &Session,
    element: &Element,
) -> WebcompatResult<bool> {
    let png = session.screenshot_element(element).await?;
    image_is_one_solid_color(&png)
}

/// Whether every pixel of a PNG sits within [`SOLID_COLOR_TOLERANCE`]
/// of the first one, per channel.
pub fn image_is_one_solid_color(png: &[u8]) -> WebcompatResult<bool> {
    let decoded = image::load_from_memory(png).map_err(|e| {
        WebcompatError::protocol("screenshot", format!("failed to decode screenshot: {e}"))
    })?;
    let rgb = decoded.to_rgb8();
    let mut pixels = rgb.pixels();
    let Some(first) = pixels.next() else {
        return Ok(true);
    };
    for pixel in pixels {
        for channel in 0..3 {
            if pixel[channel].abs_diff(first[channel]) > SOLID_COLOR_TOLERANCE {
                return Ok(false);
            }
        }
    }
    Ok(true)
}
