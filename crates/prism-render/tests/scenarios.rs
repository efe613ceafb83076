// SPDX-License-Identifier: CEPL-1.0
//! End-to-end runs of the presentation core against the dummy driver.

use ash::vk::{self, Handle};
use prism_render::dummy::{DummyDriver, DummyWindow, Event, Op};
use prism_render::{
    DeviceError, FrameError, FramePhase, InitError, ObjectKind, RenderConfig, RenderTargetError,
    Renderer, Stage, SurfaceError,
};
use rstest::rstest;

fn config() -> RenderConfig {
    RenderConfig::default()
}

#[test]
fn fallback_format_two_images_fifo() {
    let driver = DummyDriver::default();
    let journal = driver.journal();
    let window = DummyWindow::default();

    let renderer = Renderer::new(driver, &window, &config()).unwrap();

    let sc = renderer.swapchain();
    assert_eq!(sc.image_count, 2);
    assert_eq!(sc.images.len(), 2);
    assert_eq!(sc.format.format, vk::Format::B8G8R8A8_UNORM);
    assert_eq!(sc.format.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    assert_eq!(sc.present_mode, vk::PresentModeKHR::FIFO);
    assert_eq!(sc.extent, vk::Extent2D { width: 640, height: 480 });
    assert_eq!(renderer.targets().len(), 2);
    assert_eq!(renderer.phase(), FramePhase::Idle);

    let desc = journal.borrow().last_swapchain.unwrap();
    assert_eq!(desc.min_image_count, 2);
    assert_eq!(desc.sharing_mode, vk::SharingMode::EXCLUSIVE);
    assert_eq!(desc.composite_alpha, vk::CompositeAlphaFlagsKHR::OPAQUE);
    assert!(desc.clipped);
    assert_eq!(journal.borrow().last_app.as_deref(), Some("prism"));
}

#[test]
fn mailbox_is_taken_when_offered() {
    let mut driver = DummyDriver::default();
    driver.present_modes = vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
    let renderer = Renderer::new(driver, &DummyWindow::default(), &config()).unwrap();
    assert_eq!(renderer.swapchain().present_mode, vk::PresentModeKHR::MAILBOX);
}

#[test]
fn failed_acquire_skips_only_that_frame() {
    let driver =
        DummyDriver::default().fail_nth(Op::Acquire, 5, vk::Result::ERROR_OUT_OF_DATE_KHR);
    let journal = driver.journal();
    let mut window = DummyWindow::default();
    let mut renderer = Renderer::new(driver, &window, &config()).unwrap();

    let stats = renderer.run(&mut window, Some(10)).unwrap();

    assert_eq!(stats.frames, 10);
    assert_eq!(stats.presented, 9);
    assert_eq!(stats.skipped, 1);
    assert_eq!(renderer.phase(), FramePhase::Idle);

    let j = journal.borrow();
    let frames = j.frames();
    assert_eq!(frames.len(), 10);
    assert_eq!(frames[4][0], Event::AcquireFailed);
    assert!(!frames[4]
        .iter()
        .any(|e| matches!(e, Event::Submitted { .. } | Event::Presented { .. })));
    for (i, events) in frames.iter().enumerate().filter(|(i, _)| *i != 4) {
        assert!(
            events.iter().any(|e| matches!(e, Event::Submitted { .. })),
            "frame {} was not submitted",
            i + 1
        );
        assert!(events.iter().any(|e| matches!(e, Event::Presented { .. })));
    }
    assert_eq!(j.count(|e| matches!(e, Event::Submitted { .. })), 9);
    assert!(j.violations.is_empty(), "{:?}", j.violations);
}

#[test]
fn no_accelerator_stops_before_the_device() {
    let mut driver = DummyDriver::default();
    driver.physical_devices = 0;
    let journal = driver.journal();

    let err = Renderer::new(driver, &DummyWindow::default(), &config()).unwrap_err();

    assert_eq!(err, InitError::Device(DeviceError::NoAcceleratorFound));
    let j = journal.borrow();
    assert_eq!(j.created(), vec![ObjectKind::Instance]);
    assert_eq!(j.live_total(), 0);
    assert!(j.last_swapchain.is_none());
}

#[test]
fn missing_loader_is_unsupported_platform() {
    let mut driver = DummyDriver::default();
    driver.loader_available = false;
    let journal = driver.journal();

    let err = Renderer::new(driver, &DummyWindow::default(), &config()).unwrap_err();

    assert_eq!(err, InitError::Device(DeviceError::UnsupportedPlatform));
    assert!(journal.borrow().created().is_empty());
}

#[test]
fn missing_present_support_releases_the_surface() {
    let mut driver = DummyDriver::default();
    driver.present_support = false;
    let journal = driver.journal();

    let err = Renderer::new(driver, &DummyWindow::default(), &config()).unwrap_err();

    assert_eq!(err, InitError::Surface(SurfaceError::PresentationUnsupported));
    let j = journal.borrow();
    assert_eq!(j.live_total(), 0);
    assert_eq!(
        j.destroyed(),
        vec![ObjectKind::Surface, ObjectKind::Device, ObjectKind::Instance]
    );
}

#[test]
fn teardown_is_the_reverse_of_construction() {
    let driver = DummyDriver::default();
    let journal = driver.journal();
    let mut window = DummyWindow::default();
    let mut renderer = Renderer::new(driver, &window, &config()).unwrap();
    renderer.run(&mut window, Some(3)).unwrap();
    renderer.shutdown();

    let j = journal.borrow();
    let mut created = j.created();
    created.reverse();
    assert_eq!(j.destroyed(), created);
    assert_eq!(j.live_total(), 0);
    assert!(j.violations.is_empty(), "{:?}", j.violations);

    let idle = j.events.iter().position(|e| *e == Event::DeviceIdle).unwrap();
    let first_destroy = j
        .events
        .iter()
        .position(|e| matches!(e, Event::Destroyed(..)))
        .unwrap();
    assert!(idle < first_destroy);
}

#[test]
fn dropping_the_renderer_also_releases_everything() {
    let driver = DummyDriver::default();
    let journal = driver.journal();
    drop(Renderer::new(driver, &DummyWindow::default(), &config()).unwrap());
    assert_eq!(journal.borrow().live_total(), 0);
}

#[rstest]
#[case::first(1)]
#[case::second(2)]
fn image_view_failure_leaves_no_views(#[case] nth: u64) {
    let driver = DummyDriver::default().fail_nth(
        Op::CreateImageView,
        nth,
        vk::Result::ERROR_OUT_OF_HOST_MEMORY,
    );
    let journal = driver.journal();

    let err = Renderer::new(driver, &DummyWindow::default(), &config()).unwrap_err();

    assert_eq!(
        err,
        InitError::RenderTarget(RenderTargetError::ImageViewCreationFailed {
            index: nth as usize - 1,
            code: vk::Result::ERROR_OUT_OF_HOST_MEMORY,
        })
    );
    assert_eq!(err.native_code(), Some(vk::Result::ERROR_OUT_OF_HOST_MEMORY));
    let j = journal.borrow();
    assert_eq!(j.live(ObjectKind::ImageView), 0);
    assert_eq!(j.live_total(), 0);
    assert!(j.violations.is_empty(), "{:?}", j.violations);
}

#[test]
fn framebuffer_failure_rolls_back_views_too() {
    let driver = DummyDriver::default().fail_nth(
        Op::CreateFramebuffer,
        2,
        vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
    );
    let journal = driver.journal();

    let err = Renderer::new(driver, &DummyWindow::default(), &config()).unwrap_err();

    assert!(matches!(
        err,
        InitError::RenderTarget(RenderTargetError::FramebufferCreationFailed { index: 1, .. })
    ));
    let j = journal.borrow();
    assert_eq!(j.live_total(), 0);
    assert!(j.violations.is_empty(), "{:?}", j.violations);
}

#[rstest]
fn fence_modes_never_hang(
    #[values(false, true)] fence_starts_signaled: bool,
    #[values(1, 2)] frames_in_flight: u32,
) {
    let driver = DummyDriver::default();
    let journal = driver.journal();
    let mut window = DummyWindow::default();
    let cfg = RenderConfig {
        fence_starts_signaled,
        frames_in_flight,
        desired_image_count: 3,
        ..config()
    };
    let mut renderer = Renderer::new(driver, &window, &cfg).unwrap();

    let stats = renderer.run(&mut window, Some(6)).unwrap();

    assert_eq!(stats.presented, 6);
    assert_eq!(renderer.sync().slots.len(), frames_in_flight as usize);
    assert!(journal.borrow().violations.is_empty(), "{:?}", journal.borrow().violations);
}

#[test]
fn frames_in_flight_rotate_slots() {
    let driver = DummyDriver::default();
    let journal = driver.journal();
    let mut window = DummyWindow::default();
    let cfg = RenderConfig {
        frames_in_flight: 2,
        desired_image_count: 3,
        ..config()
    };
    let mut renderer = Renderer::new(driver, &window, &cfg).unwrap();
    let buffers = renderer.commands().buffers.clone();
    assert_eq!(buffers.len(), 2);

    renderer.run(&mut window, Some(4)).unwrap();

    let submitted: Vec<u64> = journal
        .borrow()
        .events
        .iter()
        .filter_map(|e| match e {
            Event::Submitted { command_buffer, .. } => Some(*command_buffer),
            _ => None,
        })
        .collect();
    let raw = |b: vk::CommandBuffer| b.as_raw();
    assert_eq!(
        submitted,
        vec![raw(buffers[0]), raw(buffers[1]), raw(buffers[0]), raw(buffers[1])]
    );
}

#[test]
fn frames_in_flight_never_exceeds_images() {
    let cfg = RenderConfig {
        frames_in_flight: 8,
        ..config()
    };
    let renderer = Renderer::new(DummyDriver::default(), &DummyWindow::default(), &cfg).unwrap();
    assert_eq!(renderer.frames().slots(), 2);
}

#[test]
fn failed_present_keeps_the_loop_running() {
    let driver =
        DummyDriver::default().fail_nth(Op::Present, 3, vk::Result::ERROR_SURFACE_LOST_KHR);
    let journal = driver.journal();
    let mut window = DummyWindow::default();
    let mut renderer = Renderer::new(driver, &window, &config()).unwrap();

    let stats = renderer.run(&mut window, Some(5)).unwrap();

    assert_eq!(stats.presented, 4);
    assert_eq!(stats.present_failures, 1);
    assert_eq!(renderer.phase(), FramePhase::Idle);
    assert_eq!(
        journal
            .borrow()
            .count(|e| matches!(e, Event::PresentFailed { .. })),
        1
    );
}

#[test]
fn failed_submit_ends_the_run() {
    let driver = DummyDriver::default().fail_nth(Op::Submit, 2, vk::Result::ERROR_DEVICE_LOST);
    let mut window = DummyWindow::default();
    let mut renderer = Renderer::new(driver, &window, &config()).unwrap();

    let err = renderer.run(&mut window, Some(10)).unwrap_err();

    assert_eq!(
        err,
        FrameError::SubmitFailed {
            frame: 2,
            code: vk::Result::ERROR_DEVICE_LOST
        }
    );
    assert!(!err.is_transient());
}

#[test]
fn close_request_ends_the_run_after_a_full_cycle() {
    let driver = DummyDriver::default();
    let journal = driver.journal();
    let mut window = DummyWindow::closing_after(3);
    let mut renderer = Renderer::new(driver, &window, &config()).unwrap();

    let stats = renderer.run(&mut window, None).unwrap();

    assert_eq!(stats.frames, 3);
    assert_eq!(
        journal
            .borrow()
            .count(|e| matches!(e, Event::Presented { .. })),
        3
    );
}

#[test]
fn single_draw_reports_the_acquired_image() {
    let mut renderer =
        Renderer::new(DummyDriver::default(), &DummyWindow::default(), &config()).unwrap();
    assert!(renderer.draw_frame().is_ok());
    assert_eq!(renderer.frames().current_image_index(), Some(0));
    assert_eq!(renderer.frames().frame_index(), 1);
}

#[test]
fn clearing_without_a_render_pass_uses_transfer() {
    let driver = DummyDriver::default();
    let journal = driver.journal();
    let cfg = RenderConfig {
        render_pass: false,
        ..config()
    };
    let renderer = Renderer::new(driver, &DummyWindow::default(), &cfg).unwrap();

    assert_eq!(renderer.targets().render_pass, vk::RenderPass::null());
    let j = journal.borrow();
    assert_eq!(j.live(ObjectKind::RenderPass), 0);
    assert_eq!(j.live(ObjectKind::Framebuffer), 0);
    let usage = j.last_swapchain.unwrap().usage;
    assert!(usage.contains(vk::ImageUsageFlags::TRANSFER_DST));
}

#[test]
fn render_pass_is_forced_without_transfer_usage() {
    let mut driver = DummyDriver::default();
    driver.capabilities.supported_usage_flags = vk::ImageUsageFlags::COLOR_ATTACHMENT;
    let journal = driver.journal();
    let cfg = RenderConfig {
        render_pass: false,
        ..config()
    };
    let renderer = Renderer::new(driver, &DummyWindow::default(), &cfg).unwrap();

    assert_ne!(renderer.targets().render_pass, vk::RenderPass::null());
    assert_eq!(journal.borrow().live(ObjectKind::Framebuffer), 2);
}

#[test]
fn wait_idle_drains_the_device_between_frames() {
    let driver = DummyDriver::default();
    let journal = driver.journal();
    let mut renderer =
        Renderer::new(driver, &DummyWindow::default(), &config()).unwrap();

    renderer.set_clear_color([1.0, 0.0, 0.0, 1.0]);
    renderer.draw_frame().unwrap();
    renderer.wait_idle().unwrap();
    renderer.draw_frame().unwrap();

    let j = journal.borrow();
    assert_eq!(j.count(|e| *e == Event::DeviceIdle), 1);
    assert_eq!(j.count(|e| matches!(e, Event::Presented { .. })), 2);
}

#[rstest]
#[case::command_pool(Op::CreateCommandPool, 1, Stage::Commands)]
#[case::command_buffers(Op::AllocateCommandBuffers, 1, Stage::Commands)]
#[case::second_fence(Op::CreateFence, 2, Stage::Sync)]
#[case::third_semaphore(Op::CreateSemaphore, 3, Stage::Sync)]
fn late_stage_failure_releases_in_reverse(
    #[case] op: Op,
    #[case] nth: u64,
    #[case] stage: Stage,
) {
    let driver = DummyDriver::default().fail_nth(op, nth, vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
    let journal = driver.journal();
    let cfg = RenderConfig {
        frames_in_flight: 2,
        desired_image_count: 3,
        ..config()
    };

    let err = Renderer::new(driver, &DummyWindow::default(), &cfg).unwrap_err();

    assert_eq!(err.stage(), stage);
    assert_eq!(err.native_code(), Some(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY));
    let j = journal.borrow();
    let mut created = j.created();
    created.reverse();
    assert_eq!(j.destroyed(), created);
    assert_eq!(j.live_total(), 0);
    assert!(j.violations.is_empty(), "{:?}", j.violations);
}

#[test]
fn single_slot_waits_on_its_fence_before_present() {
    let driver = DummyDriver::default();
    let journal = driver.journal();
    let mut window = DummyWindow::default();
    let mut renderer = Renderer::new(driver, &window, &config()).unwrap();
    assert_eq!(renderer.frames().slots(), 1);

    renderer.run(&mut window, Some(4)).unwrap();

    let j = journal.borrow();
    let frames = j.frames();
    assert_eq!(frames.len(), 4);
    for (i, events) in frames.iter().enumerate() {
        let (submit_at, fence) = events
            .iter()
            .enumerate()
            .find_map(|(at, e)| match e {
                Event::Submitted { fence, .. } => Some((at, *fence)),
                _ => None,
            })
            .unwrap();
        let waited_at = events
            .iter()
            .position(|e| *e == Event::FenceWaited(fence))
            .unwrap_or_else(|| panic!("frame {} never waited on its fence", i + 1));
        let presented_at = events
            .iter()
            .position(|e| matches!(e, Event::Presented { .. }))
            .unwrap();
        assert!(submit_at < waited_at, "frame {}", i + 1);
        assert!(waited_at < presented_at, "frame {}", i + 1);
    }
    assert!(j.violations.is_empty(), "{:?}", j.violations);
}

#[test]
fn single_slot_waits_once_per_frame() {
    let driver = DummyDriver::default();
    let journal = driver.journal();
    let mut window = DummyWindow::default();
    let mut renderer = Renderer::new(driver, &window, &config()).unwrap();

    renderer.run(&mut window, Some(5)).unwrap();

    let j = journal.borrow();
    assert_eq!(j.count(|e| matches!(e, Event::FenceWaited(_))), 5);
    assert_eq!(j.count(|e| matches!(e, Event::FenceReset(_))), 4);
    assert!(j.violations.is_empty(), "{:?}", j.violations);
}

#[test]
fn extension_query_failure_is_counted_per_call() {
    let driver = DummyDriver::default().fail_nth(
        Op::RequiredExtensions,
        2,
        vk::Result::ERROR_EXTENSION_NOT_PRESENT,
    );
    assert!(Renderer::new(driver, &DummyWindow::default(), &config()).is_ok());

    let driver = DummyDriver::default().fail_nth(
        Op::RequiredExtensions,
        1,
        vk::Result::ERROR_EXTENSION_NOT_PRESENT,
    );
    let journal = driver.journal();
    let err = Renderer::new(driver, &DummyWindow::default(), &config()).unwrap_err();

    assert_eq!(
        err,
        InitError::Device(DeviceError::ContextCreationFailed(
            vk::Result::ERROR_EXTENSION_NOT_PRESENT
        ))
    );
    assert!(journal.borrow().created().is_empty());
}
