//! Teensy 4 firmware binary for the 32-sensor IMU array board.
//!
//! Pinout (address lines drive two cascaded 74HC238 decoders; see
//! `bus_adapter`):
//!
//! - Pin 13 (SCK), 11 (MOSI), 12 (MISO): SPI4, shared by all 32 sensors
//! - Pins 2-5: decoder address lines A0-A2 and bank select
//! - Pin 6: decoder output enable
//! - Pins 20 (SCK), 21 (MOSI), 22 (MISO), 23 (CS): SPI1, SD card
//! - Pins 14 (TX), 15 (RX): UART2, host register-bus link

#![no_std]
#![no_main]

mod bus_adapter;
mod hostlink;
mod storage;

extern crate panic_halt;

use core::cell::RefCell;
use core::time::Duration;

use bsp::hal::ccm;
use bsp::rt::entry;
use critical_section::Mutex;
use embedded_hal::timer::{Cancel, CountDown};
use teensy4_bsp as bsp;

use imu_core::calibration::CalibrationBlock;
use imu_core::config::NUM_SENSORS;
use imu_core::hal::{DelaySource, TickSource};
use imu_core::CoreContext;

use bus_adapter::{GpioAddressLines, SpiSensorBus};
use hostlink::HostLink;
use storage::SdStorage;

const SPI_BAUD_RATE_HZ: u32 = 4_000_000;

/// Wraps a PIT channel as the acquisition [`TickSource`]; start/stop are
/// called from mode transitions, the period itself is fixed by
/// `SAMPLE_RATE_HZ`.
struct PitTick<'a, C> {
    channel: &'a mut C,
    period: Duration,
}

impl<'a, C> TickSource for PitTick<'a, C>
where
    C: CountDown<Time = Duration> + Cancel,
{
    fn start(&mut self) {
        self.channel.start(self.period);
    }

    fn stop(&mut self) {
        let _ = self.channel.cancel();
    }
}

struct SystickDelay<'a>(&'a mut bsp::SysTick);

impl<'a> DelaySource for SystickDelay<'a> {
    fn delay_ms(&mut self, ms: u8) {
        self.0.delay(ms as u32);
    }
}

/// The one owned core context, reached into from the foreground loop.
/// A real two-wire slave interrupt would also reach in here through this
/// same mutex; this board drives the register bus from the foreground
/// loop instead (see `hostlink`), so nothing else touches it today.
static CONTEXT: Mutex<RefCell<Option<CoreContext>>> = Mutex::new(RefCell::new(None));

#[entry]
fn main() -> ! {
    let mut peripherals = bsp::Peripherals::take().unwrap();
    let core_peripherals = cortex_m::Peripherals::take().unwrap();
    let mut systick = bsp::SysTick::new(core_peripherals.SYST);
    let pins = bsp::t40::into_pins(peripherals.iomuxc);

    peripherals.usb.init(bsp::usb::LoggingConfig {
        filters: &[],
        ..Default::default()
    });

    let (_, ipg_hz) = peripherals.ccm.pll1.set_arm_clock(
        ccm::PLL1::ARM_HZ,
        &mut peripherals.ccm.handle,
        &mut peripherals.dcdc,
    );

    systick.delay(5000);
    log::info!("Bringing up SPI4 for the sensor array...");

    let (_, _, _, spi4_builder) = peripherals.spi.clock(
        &mut peripherals.ccm.handle,
        ccm::spi::ClockSelect::Pll2,
        ccm::spi::PrescalarSelect::LPSPI_PODF_5,
    );
    let mut spi4 = spi4_builder.build(pins.p11, pins.p12, pins.p13);
    match spi4.set_clock_speed(bsp::hal::spi::ClockSpeed(SPI_BAUD_RATE_HZ)) {
        Ok(()) => log::info!("SPI4 clock set to {}Hz", SPI_BAUD_RATE_HZ),
        Err(err) => {
            log::error!("Unable to set SPI4 clock speed: {:?}", err);
            halt();
        }
    }

    let addr = GpioAddressLines {
        a0: bsp::hal::gpio::GPIO::new(pins.p2).output(),
        a1: bsp::hal::gpio::GPIO::new(pins.p3).output(),
        a2: bsp::hal::gpio::GPIO::new(pins.p4).output(),
        bank_select: bsp::hal::gpio::GPIO::new(pins.p5).output(),
        enable: bsp::hal::gpio::GPIO::new(pins.p6).output(),
    };
    let mut sensor_bus = SpiSensorBus::new(spi4, addr);

    log::info!("Bringing up SPI1 for the SD card...");
    let (spi1_builder, _, _, _) = peripherals.spi.clock(
        &mut peripherals.ccm.handle,
        ccm::spi::ClockSelect::Pll2,
        ccm::spi::PrescalarSelect::LPSPI_PODF_5,
    );
    let mut spi1 = spi1_builder.build(pins.p21, pins.p22, pins.p20);
    let _ = spi1.set_clock_speed(bsp::hal::spi::ClockSpeed(8_000_000));
    let cs = bsp::hal::gpio::GPIO::new(pins.p23).output();
    let sd_card = embedded_sdmmc::SdCard::new(spi1, cs, SystickDelay(&mut systick));
    let mut storage = SdStorage::new(sd_card);

    log::info!("Bringing up UART2 for the host register bus...");
    let uarts = peripherals.uart.clock(
        &mut peripherals.ccm.handle,
        ccm::uart::ClockSelect::OSC,
        ccm::uart::PrescalarSelect::DIVIDE_1,
    );
    let uart = uarts.uart2.init(pins.p14, pins.p15, 115_200).unwrap();
    let (mut uart_tx, mut uart_rx) = uart.split();
    let mut host_link = HostLink::new();

    log::info!("Bringing up the acquisition tick timer...");
    let mut pit_cfg = peripherals.ccm.perclk.configure(
        &mut peripherals.ccm.handle,
        ccm::perclk::PODF::DIVIDE_3,
        ccm::perclk::CLKSEL::IPG(ipg_hz),
    );
    let (_, _, _, mut sensor_timer) = peripherals.pit.clock(&mut pit_cfg);
    let mut tick = PitTick {
        channel: &mut sensor_timer,
        period: Duration::from_micros(1_000_000 / imu_core::config::SAMPLE_RATE_HZ as u64),
    };

    let calibration: [CalibrationBlock; NUM_SENSORS] =
        core::array::from_fn(|_| CalibrationBlock::identity());
    let mut ctx = CoreContext::new(calibration);

    log::info!("Booting sensor array...");
    if let Err(err) = ctx.boot(&mut sensor_bus, &mut SystickDelay(&mut systick)) {
        log::error!("Sensor array boot failed: {:?}", err);
        halt();
    }
    log::info!("Array presence bitmap: {:#010X}", ctx.presence().as_u32());

    critical_section::with(|cs| {
        CONTEXT.borrow(cs).replace(Some(ctx));
    });

    let mut tick_count: u32 = 0;
    log::info!("=============READY=============");
    loop {
        critical_section::with(|cs| {
            let mut slot = CONTEXT.borrow(cs).borrow_mut();
            let ctx = slot.as_mut().expect("populated before the loop starts");

            if let Ok(byte) = uart_rx.read() {
                if let Some(reply) = host_link.feed(byte, |event| ctx.on_bus_event(event)) {
                    let _ = nb::block!(uart_tx.write(reply));
                }
            }

            if let Err(err) = ctx.poll_foreground(&mut sensor_bus, &mut storage, &mut tick) {
                log::warn!("poll_foreground error: {:?}", err);
            }

            if tick.channel.wait().is_ok() {
                tick_count += 1;
                if let Err(err) = ctx.on_tick(&mut sensor_bus, tick_count) {
                    log::warn!("on_tick error: {:?}", err);
                }
            }
        });
    }
}

fn halt() -> ! {
    loop {
        core::sync::atomic::spin_loop_hint();
    }
}
