// SPDX-License-Identifier: CEPL-1.0
use prism_render::{
    Driver, FrameError, InitError, PresentationWindow, RenderConfig, Renderer, RunStats,
};
use tracing::info;

/// One window plus the renderer presenting into it, for the life of the
/// process.
///
/// The renderer is declared first so it drops before the window: the
/// surface must go before the native window it was created from.
pub struct App<D: Driver, W: PresentationWindow> {
    renderer: Renderer<D>,
    window: W,
    frame_limit: Option<u64>,
}

impl<D: Driver, W: PresentationWindow> App<D, W> {
    pub fn init(
        driver: D,
        window: W,
        config: &RenderConfig,
        frame_limit: Option<u64>,
    ) -> Result<Self, InitError> {
        let size = window.size();
        info!("starting {} at {}x{}", config.app_name, size.width, size.height);
        let renderer = Renderer::new(driver, &window, config)?;
        Ok(App {
            renderer,
            window,
            frame_limit,
        })
    }

    pub fn renderer(&self) -> &Renderer<D> {
        &self.renderer
    }

    pub fn window(&self) -> &W {
        &self.window
    }

    /// Runs until the window closes, the frame limit is hit, or a frame
    /// fails fatally.
    pub fn run(&mut self) -> Result<RunStats, FrameError> {
        self.renderer.run(&mut self.window, self.frame_limit)
    }

    pub fn shutdown(self) {
        let App {
            renderer, window, ..
        } = self;
        renderer.shutdown();
        drop(window);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_render::dummy::{DummyDriver, DummyWindow, Op};
    use prism_render::vk;

    #[test]
    fn runs_to_the_frame_limit_and_cleans_up() {
        let driver = DummyDriver::default();
        let journal = driver.journal();
        let mut app = App::init(
            driver,
            DummyWindow::default(),
            &RenderConfig::default(),
            Some(5),
        )
        .unwrap();
        assert_eq!(app.renderer().swapchain().image_count, 2);

        let stats = app.run().unwrap();
        assert_eq!(stats.frames, 5);
        assert_eq!(stats.presented, 5);
        assert_eq!(app.window().polls, 5);

        app.shutdown();
        assert_eq!(journal.borrow().live_total(), 0);
        assert!(journal.borrow().violations.is_empty());
    }

    #[test]
    fn window_close_wins_over_a_larger_limit() {
        let mut app = App::init(
            DummyDriver::default(),
            DummyWindow::closing_after(2),
            &RenderConfig::default(),
            Some(100),
        )
        .unwrap();
        assert_eq!(app.run().unwrap().frames, 2);
    }

    #[test]
    fn startup_failure_is_reported() {
        let driver =
            DummyDriver::default().fail_always(Op::CreateSwapchain, vk::Result::ERROR_SURFACE_LOST_KHR);
        let journal = driver.journal();
        let err = App::init(driver, DummyWindow::default(), &RenderConfig::default(), None)
            .err()
            .unwrap();
        assert_eq!(err.stage(), prism_render::Stage::Swapchain);
        assert_eq!(journal.borrow().live_total(), 0);
    }
}
