//! HAL Eye Firmware - ESP32-S3 round status display
//!
//! Environment variables required:
//! - WIFI_SSID: WiFi network name
//! - WIFI_PASS: WiFi password
//! - SERVER_URL: Backend URL (e.g., http://192.168.1.20:5000)

#![no_std]
#![no_main]

extern crate alloc;

use core::alloc::Layout;

use embassy_executor::Spawner;
use embassy_net::{Runner, Stack, StackResources};
use embassy_sync::blocking_mutex::raw::{CriticalSectionRawMutex, NoopRawMutex};
use embassy_time::{Delay, Duration, Instant, Timer, with_timeout};
use esp_alloc as _;
use esp_backtrace as _;
use esp_hal::{
    Blocking,
    clock::CpuClock,
    dma::{DmaDescriptor, DmaTxBuf, ExternalBurstConfig},
    gpio::{Input, InputConfig, Level, Output, OutputConfig, Pull},
    lcd_cam::{
        LcdCam,
        lcd::{
            ClockMode, Phase, Polarity,
            dpi::{Config as DpiConfig, Dpi, Format, FrameTiming},
        },
    },
    ram,
    rng::Rng,
    time::Rate,
    timer::timg::TimerGroup,
};
use esp_radio::{
    Controller as RadioController,
    wifi::{
        ClientConfig, Config as WifiConfig, ModeConfig, WifiController, WifiDevice, WifiEvent,
        WifiStaState,
    },
};
use hal_eye_firmware::config::Config;
use hal_eye_firmware::controller::{self, Controller, ControllerState};
use hal_eye_firmware::decode::JpegFrameDecoder;
use hal_eye_firmware::framebuffer::FrameBuffer;
use hal_eye_firmware::input::{InputEvent, InputQueue, Quadrature};
use hal_eye_firmware::net::NetTransport;
use hal_eye_firmware::render::RenderLock;
use hal_eye_firmware::scene::Scene;
use hal_eye_firmware::st7701::St7701;
use hal_eye_firmware::state::Mode;

esp_bootloader_esp_idf::esp_app_desc!();

// When you are okay with using a nightly compiler it's better to use https://docs.rs/static_cell/2.1.0/static_cell/macro.make_static.html
macro_rules! mk_static {
    ($t:ty,$val:expr) => {{
        static STATIC_CELL: static_cell::StaticCell<$t> = static_cell::StaticCell::new();
        #[deny(unused_attributes)]
        let x = STATIC_CELL.uninit().write(($val));
        x
    }};
}

const SSID: &str = env!("WIFI_SSID");
const PASSWORD: &str = env!("WIFI_PASS");
const SERVER_URL: &str = env!("SERVER_URL");

const CONFIG: Config = Config::new();

/// Panel side in pixels
const SCREEN_SIZE: usize = CONFIG.display_size as usize;
/// RGB565 scan-out buffer size
const SCREEN_BYTES: usize = SCREEN_SIZE * SCREEN_SIZE * 2;
/// DMA descriptors covering the scan-out buffer (4032-byte chunks)
const SCREEN_DESCRIPTORS: usize = SCREEN_BYTES.div_ceil(4032);

/// Longest network loop sleep between scheduler passes
const IDLE_DELAY: Duration = Duration::from_millis(10);
/// Wait between Wi-Fi connection attempts
const RECONNECT_DELAY: Duration = Duration::from_secs(5);
/// Bound on DHCP after association, only used for logging
const DHCP_TIMEOUT: Duration = Duration::from_secs(30);
/// Poll interval while a scan-out frame is in flight
const SCAN_POLL: Duration = Duration::from_micros(500);
/// Input line sampling period
const INPUT_PERIOD: Duration = Duration::from_millis(1);

type State = ControllerState<Scene>;
type Lock = RenderLock<NoopRawMutex, State>;

/// Fed by the input task, drained by the network loop
static INPUT: InputQueue<CriticalSectionRawMutex> = InputQueue::new();

#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    // Init logger first so we can see any early crashes
    esp_println::logger::init_logger_from_env();

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    log::info!("Initializing heap...");
    esp_alloc::heap_allocator!(#[ram(reclaimed)] size: 64 * 1024);
    esp_alloc::heap_allocator!(size: 36 * 1024);

    // Frame buffers and the scan-out buffer live in PSRAM
    esp_alloc::psram_allocator!(&peripherals.PSRAM, esp_hal::psram);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(
        timg0.timer0,
        #[cfg(target_arch = "riscv32")]
        esp_hal::interrupt::software::SoftwareInterruptControl::new(peripherals.SW_INTERRUPT)
            .software_interrupt0,
    );
    log::info!("RTOS started");

    // ==================== Panel ====================
    let _backlight = Output::new(peripherals.GPIO38, Level::High, OutputConfig::default());
    let mut registers = St7701::new(
        Output::new(peripherals.GPIO39, Level::High, OutputConfig::default()),
        Output::new(peripherals.GPIO48, Level::Low, OutputConfig::default()),
        Output::new(peripherals.GPIO47, Level::Low, OutputConfig::default()),
    );
    registers.init(&mut Delay);

    let layout = Layout::from_size_align(SCREEN_BYTES, 64).unwrap();
    // SAFETY: non-zero size; the buffer is never freed and from here on is
    // only reachable through the DMA buffer
    let pixels = unsafe { alloc::alloc::alloc_zeroed(layout) };
    assert!(!pixels.is_null(), "scan-out buffer allocation failed");
    let scan_out: &'static mut [u8] = unsafe { core::slice::from_raw_parts_mut(pixels, SCREEN_BYTES) };
    let descriptors = mk_static!(
        [DmaDescriptor; SCREEN_DESCRIPTORS],
        [DmaDescriptor::EMPTY; SCREEN_DESCRIPTORS]
    );
    let dma_buf = DmaTxBuf::new_with_config(descriptors, scan_out, ExternalBurstConfig::Size64).unwrap();

    let lcd_cam = LcdCam::new(peripherals.LCD_CAM);
    let dpi_config = DpiConfig::default()
        .with_clock_mode(ClockMode {
            polarity: Polarity::IdleLow,
            phase: Phase::ShiftHigh,
        })
        .with_frequency(Rate::from_mhz(12))
        .with_format(Format {
            enable_2byte_mode: true,
            ..Default::default()
        })
        .with_timing(FrameTiming {
            horizontal_active_width: SCREEN_SIZE,
            horizontal_total_width: SCREEN_SIZE + 10 + 8 + 50,
            horizontal_blank_front_porch: 8 + 50,
            vertical_active_height: SCREEN_SIZE,
            vertical_total_height: SCREEN_SIZE + 10 + 8 + 20,
            vertical_blank_front_porch: 8 + 20,
            hsync_width: 8,
            vsync_width: 8,
            hsync_position: 0,
        })
        .with_vsync_idle_level(Level::High)
        .with_hsync_idle_level(Level::High)
        .with_de_idle_level(Level::Low)
        .with_disable_black_region(false);

    let dpi = Dpi::new(lcd_cam.lcd, peripherals.DMA_CH2, dpi_config)
        .unwrap()
        .with_de(peripherals.GPIO18)
        .with_vsync(peripherals.GPIO17)
        .with_hsync(peripherals.GPIO16)
        .with_pclk(peripherals.GPIO21)
        // Blue
        .with_data0(peripherals.GPIO4)
        .with_data1(peripherals.GPIO5)
        .with_data2(peripherals.GPIO6)
        .with_data3(peripherals.GPIO7)
        .with_data4(peripherals.GPIO15)
        // Green
        .with_data5(peripherals.GPIO8)
        .with_data6(peripherals.GPIO20)
        .with_data7(peripherals.GPIO3)
        .with_data8(peripherals.GPIO46)
        .with_data9(peripherals.GPIO9)
        .with_data10(peripherals.GPIO10)
        // Red
        .with_data11(peripherals.GPIO11)
        .with_data12(peripherals.GPIO12)
        .with_data13(peripherals.GPIO13)
        .with_data14(peripherals.GPIO14)
        .with_data15(peripherals.GPIO0);

    log::info!("Panel configured");

    // ==================== Controller state ====================
    let frame = FrameBuffer::allocate(CONFIG.display_size, CONFIG.display_size).unwrap();
    let (face, fetcher) = match controller::allocate_face(&CONFIG) {
        Ok((buffer, fetcher)) => (Ok(buffer), Some(fetcher)),
        Err(e) => (Err(e), None),
    };
    let state = ControllerState::new(Scene::new(CONFIG.display_size), &CONFIG, face);
    let lock: &'static Lock = mk_static!(Lock, RenderLock::new(state));

    spawner.spawn(display_task(lock, dpi, dma_buf, frame)).ok();

    // ==================== Input ====================
    let encoder_a = Input::new(peripherals.GPIO41, InputConfig::default().with_pull(Pull::Up));
    let encoder_b = Input::new(peripherals.GPIO42, InputConfig::default().with_pull(Pull::Up));
    let button = Input::new(peripherals.GPIO40, InputConfig::default().with_pull(Pull::Up));
    spawner.spawn(input_task(encoder_a, encoder_b, button)).ok();

    // ==================== Network ====================
    let rng = Rng::new();
    let radio = mk_static!(RadioController<'static>, esp_radio::init().unwrap());
    let (wifi_ctrl, ifaces) = esp_radio::wifi::new(radio, peripherals.WIFI, WifiConfig::default()).unwrap();

    let (stack, runner) = embassy_net::new(
        ifaces.sta,
        embassy_net::Config::dhcpv4(Default::default()),
        mk_static!(StackResources<3>, StackResources::<3>::new()),
        rng.random() as u64,
    );
    spawner.spawn(net_task(runner)).ok();
    spawner.spawn(connection_task(wifi_ctrl, stack)).ok();

    // Runs while offline too: polls are skipped and the label reads offline
    let transport = NetTransport::new(stack, SERVER_URL).unwrap();
    let mut controller = Controller::new(
        CONFIG,
        transport,
        JpegFrameDecoder::new(CONFIG.display_size),
        fetcher,
    );

    log::info!("Polling {}", SERVER_URL);
    loop {
        controller.run_once(lock, &INPUT).await;
        let face_mode = lock.with(|state| state.mode() == Mode::Face);
        let wake = controller.next_wake(Instant::now(), face_mode);
        Timer::after(wake.min(IDLE_DELAY)).await;
    }
}

/// Scan frames out to the panel back to back, advancing the eye on the
/// animation period. Composition happens in `frame` while the DMA engine
/// reads the scan-out buffer; changed frames are copied over between scans.
#[embassy_executor::task]
async fn display_task(
    lock: &'static Lock,
    mut dpi: Dpi<'static, Blocking>,
    mut scan_out: DmaTxBuf,
    mut frame: FrameBuffer,
) {
    let period = CONFIG.animation_period;
    let mut last = Instant::now();
    let mut next_tick = last;
    let mut dirty = false;

    loop {
        let transfer = match dpi.send(false, scan_out) {
            Ok(transfer) => transfer,
            Err((e, idle, buf)) => {
                log::error!("Scan-out failed to start: {:?}", e);
                dpi = idle;
                scan_out = buf;
                Timer::after(period).await;
                continue;
            }
        };

        let now = Instant::now();
        if now >= next_tick {
            let dt = now - last;
            last = now;
            next_tick = now + period;
            let drawn = lock.with(|state| {
                state.animate(dt);
                state.compose(&mut frame)
            });
            // Infallible target
            dirty |= matches!(drawn, Ok(true));
        }

        while !transfer.is_done() {
            Timer::after(SCAN_POLL).await;
        }
        let (result, idle, buf) = transfer.wait();
        dpi = idle;
        scan_out = buf;
        if let Err(e) = result {
            log::warn!("Scan-out error: {:?}", e);
        }

        // The buffer is ours again; the next send writes the cache back
        if dirty {
            frame.copy_to_le_bytes(scan_out.as_mut_slice());
            dirty = false;
        }
    }
}

/// Sample the encoder and its push button into the input queue
#[embassy_executor::task]
async fn input_task(a: Input<'static>, b: Input<'static>, button: Input<'static>) {
    let mut quadrature = Quadrature::new(a.is_high(), b.is_high());
    // Active low
    let mut pressed = button.is_low();
    loop {
        if let Some(event) = quadrature.update(a.is_high(), b.is_high()) {
            INPUT.push(event);
        }

        let now_pressed = button.is_low();
        if now_pressed != pressed {
            pressed = now_pressed;
            INPUT.push(if pressed {
                InputEvent::Press
            } else {
                InputEvent::Release
            });
        }

        Timer::after(INPUT_PERIOD).await;
    }
}

/// Keep the station associated: connect, wait for the drop, reconnect
#[embassy_executor::task]
async fn connection_task(mut controller: WifiController<'static>, stack: Stack<'static>) {
    log::info!("Device capabilities: {:?}", controller.capabilities());

    loop {
        if esp_radio::wifi::sta_state() == WifiStaState::Connected {
            controller.wait_for_event(WifiEvent::StaDisconnected).await;
            log::warn!("WiFi disconnected");
            Timer::after(RECONNECT_DELAY).await;
        }

        if !matches!(controller.is_started(), Ok(true)) {
            let client_config = ModeConfig::Client(
                ClientConfig::default()
                    .with_ssid(SSID.into())
                    .with_password(PASSWORD.into()),
            );
            controller.set_config(&client_config).unwrap();
            log::info!("Starting WiFi...");
            controller.start_async().await.unwrap();
        }

        log::info!("Connecting to {}...", SSID);
        match controller.connect_async().await {
            Ok(_) => {
                log::info!("WiFi connected!");
                log_address(stack).await;
            }
            Err(e) => {
                log::warn!("Failed to connect: {e:?}, retrying...");
                Timer::after(RECONNECT_DELAY).await;
            }
        }
    }
}

/// Log the DHCP address once it arrives
async fn log_address(stack: Stack<'static>) {
    match with_timeout(DHCP_TIMEOUT, stack.wait_config_up()).await {
        Ok(()) => {
            if let Some(config) = stack.config_v4() {
                log::info!("Got IP: {}", config.address);
            }
        }
        Err(_) => log::warn!("No DHCP lease yet"),
    }
}

#[embassy_executor::task]
async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) {
    runner.run().await
}
