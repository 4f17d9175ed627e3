use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use futures_executor::LocalPool;
use futures_task::LocalSpawn;
use std::boxed::Box;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Mutex;
use std::vec::Vec;
use wizchip::chip::Chip;
use wizchip::config::Config;
use wizchip::core::{Protocol, SocketFlags, SocketId, SocketStatus};
use wizchip::dispatch::{Deferred, Dispatcher, Worker};
use wizchip::driver::BusError;
use wizchip::driver::sim::{ConnectBehavior, SimBus, Simulator, State};
use wizchip::error::{Error, RegistryError, RequestError};
use wizchip::interface::{
    Interface, SocketEvent, SocketHandler, Station, StationQueue, StationWorker,
};
use wizchip::irq::{InterruptLine, InterruptLines};
use wizchip::registry::{Binding, Registry};
use wizchip::socket::Sockets;

type Raw = CriticalSectionRawMutex;
const QUEUE: usize = 16;

type TestInterface = Interface<'static, Raw, SimBus, QUEUE>;
type TestWorker = StationWorker<'static, Raw, SimBus, QUEUE>;
type TestStation = Station<'static, Raw, SimBus>;

/// Owned copy of a [`SocketEvent`]
#[derive(Debug, Clone, PartialEq, Eq)]
enum Seen {
    Connected,
    Disconnected,
    Received(Vec<u8>, Option<SocketAddrV4>),
    TxComplete,
    Timeout,
    Error(Error),
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<(u8, Seen)>>,
}

impl Recorder {
    fn take(&self) -> Vec<(u8, Seen)> {
        core::mem::take(&mut *self.events.lock().unwrap())
    }
}

impl SocketHandler for Recorder {
    fn on_event(&self, sn: SocketId, event: SocketEvent<'_>, _sockets: &mut dyn Sockets) {
        let seen = match event {
            SocketEvent::Connected => Seen::Connected,
            SocketEvent::Disconnected => Seen::Disconnected,
            SocketEvent::Received { data, from } => Seen::Received(data.to_vec(), from),
            SocketEvent::TxComplete => Seen::TxComplete,
            SocketEvent::Timeout => Seen::Timeout,
            SocketEvent::Error(err) => Seen::Error(err),
        };
        self.events.lock().unwrap().push((sn.into_u8(), seen));
    }
}

/// Answers every received chunk on the worker
struct Echo;

impl SocketHandler for Echo {
    fn on_event(&self, sn: SocketId, event: SocketEvent<'_>, sockets: &mut dyn Sockets) {
        if let SocketEvent::Received { data, .. } = event {
            sockets.send(sn.into_u8(), data).unwrap();
        }
    }
}

/// Records every event and answers received data with two separate sends
#[derive(Default)]
struct DoubleSend {
    recorder: Recorder,
}

impl SocketHandler for DoubleSend {
    fn on_event(&self, sn: SocketId, event: SocketEvent<'_>, sockets: &mut dyn Sockets) {
        let received = matches!(event, SocketEvent::Received { .. });
        self.recorder.on_event(sn, event, sockets);
        if received {
            sockets.send(sn.into_u8(), b"first").unwrap();
            sockets.send(sn.into_u8(), b"second").unwrap();
        }
    }
}

struct Setup {
    sim: Simulator,
    registry: &'static Registry<'static, Raw>,
    queue: &'static StationQueue<'static, Raw, SimBus, QUEUE>,
    interface: TestInterface,
    worker: TestWorker,
    recorder: &'static Recorder,
}

fn setup() -> Setup {
    let sim = Simulator::new();
    let chip = Chip::new(sim.bus(), &Config::default()).unwrap();
    let registry: &'static Registry<'static, Raw> = Box::leak(Box::new(Registry::new()));
    let queue: &'static StationQueue<'static, Raw, SimBus, QUEUE> =
        Box::leak(Box::new(Dispatcher::new()));
    let pool: &'static mut [u8] = Box::leak(std::vec![0u8; 16 * 1024].into_boxed_slice());
    let station = Station::new(chip, registry, pool).unwrap();
    Setup {
        sim,
        registry,
        queue,
        interface: Interface::new(registry, queue),
        worker: Worker::new(queue, station),
        recorder: Box::leak(Box::new(Recorder::default())),
    }
}

#[test]
fn test_rx_pool_must_cover_partition() {
    let sim = Simulator::new();
    let chip = Chip::new(sim.bus(), &Config::default()).unwrap();
    let registry: &'static Registry<'static, Raw> = Box::leak(Box::new(Registry::new()));
    let pool: &'static mut [u8] = Box::leak(std::vec![0u8; 1024].into_boxed_slice());
    assert!(Station::new(chip, registry, pool).is_err());
}

#[test]
fn test_tcp_server_connect() {
    let mut s = setup();
    let sn = s.interface.init_port(80, Protocol::Tcp, s.recorder).unwrap();
    assert_eq!(sn, SocketId::MIN);
    assert_eq!(s.queue.len(), 2);
    assert!(s.registry.is_in_use(sn));
    assert_eq!(s.registry.status(sn), SocketStatus::Closed);

    assert_eq!(s.worker.run_pending(), 2);
    assert_eq!(s.sim.lock().status(sn), SocketStatus::Listen);
    assert_eq!(s.registry.status(sn), SocketStatus::Listen);

    s.sim.lock().peer_connect(sn);
    s.interface.on_interrupt();
    assert_eq!(s.worker.run_pending(), 1);
    assert_eq!(s.recorder.take(), [(0, Seen::Connected)]);
    assert_eq!(s.registry.status(sn), SocketStatus::Established);

    // Serviced sources stay acknowledged
    s.interface.request_service().unwrap();
    s.worker.run_pending();
    assert!(s.recorder.take().is_empty());

    let state = s.sim.lock();
    for other in SocketId::all().skip(1) {
        assert_eq!(state.status(other), SocketStatus::Closed);
        assert!(state.commands(other).is_empty());
    }
}

#[test]
fn test_send_complete_once() {
    let mut s = setup();
    let sn = s.interface.init_port(80, Protocol::Tcp, s.recorder).unwrap();
    s.worker.run_pending();
    s.sim.lock().peer_connect(sn);
    s.interface.on_interrupt();
    s.worker.run_pending();
    s.recorder.take();

    let data: Vec<u8> = (0..3000u32).map(|i| (i % 7) as u8).collect();
    let chip = s.worker.context_mut().chip();
    assert_eq!(chip.send(sn.into_u8(), &data), Ok(2048));
    assert_eq!(chip.is_sending(sn.into_u8()), Ok(true));

    s.interface.on_interrupt();
    s.worker.run_pending();
    assert_eq!(s.recorder.take(), [(0, Seen::TxComplete)]);
    assert_eq!(
        s.worker.context_mut().chip().is_sending(sn.into_u8()),
        Ok(false)
    );

    s.interface.on_interrupt();
    s.worker.run_pending();
    assert!(s.recorder.take().is_empty());
}

#[test]
fn test_receive_drain() {
    let mut s = setup();
    let tcp = s.interface.init_port(80, Protocol::Tcp, s.recorder).unwrap();
    let udp = s.interface.init_port(5000, Protocol::Udp, s.recorder).unwrap();
    s.worker.run_pending();
    assert_eq!(s.registry.status(udp), SocketStatus::Udp);

    let from = SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 7), 4000);
    {
        let mut state = s.sim.lock();
        state.peer_connect(tcp);
        state.peer_send(tcp, b"hello");
        state.peer_send_datagram(udp, (*from.ip(), from.port()), b"one");
        state.peer_send_datagram(udp, (*from.ip(), from.port()), b"two");
    }
    s.interface.on_interrupt();
    s.worker.run_pending();

    assert_eq!(
        s.recorder.take(),
        [
            (0, Seen::Connected),
            (0, Seen::Received(b"hello".to_vec(), None)),
            (1, Seen::Received(b"one".to_vec(), Some(from))),
            (1, Seen::Received(b"two".to_vec(), Some(from))),
        ]
    );
    assert_eq!(s.registry.remote(udp), Some(from));
    let state = s.sim.lock();
    assert!(state.interrupts(tcp).is_empty());
    assert!(state.interrupts(udp).is_empty());
}

#[test]
fn test_handler_answers_on_worker() {
    let mut s = setup();
    let sn = s.interface.init_port(7, Protocol::Tcp, &Echo).unwrap();
    s.worker.run_pending();
    s.sim.lock().peer_connect(sn);
    s.sim.lock().peer_send(sn, b"echo me");
    s.interface.on_interrupt();
    s.worker.run_pending();
    assert_eq!(s.sim.lock().sent(sn), [b"echo me".to_vec()]);
}

#[test]
fn test_back_to_back_sends_complete_once_each() {
    let mut s = setup();
    let handler: &'static DoubleSend = Box::leak(Box::default());
    let sn = s.interface.init_port(80, Protocol::Tcp, handler).unwrap();
    s.worker.run_pending();
    s.sim.lock().peer_connect(sn);
    s.sim.lock().peer_send(sn, b"go");
    s.interface.on_interrupt();
    s.worker.run_pending();
    s.interface.on_interrupt();
    s.worker.run_pending();

    assert_eq!(
        s.sim.lock().sent(sn),
        [b"first".to_vec(), b"second".to_vec()]
    );
    let events = handler.recorder.take();
    let completions = events
        .iter()
        .filter(|(_, seen)| *seen == Seen::TxComplete)
        .count();
    assert_eq!(completions, 2);
    assert_eq!(events[0], (0, Seen::Connected));
    assert_eq!(events[1], (0, Seen::Received(b"go".to_vec(), None)));

    s.interface.on_interrupt();
    s.worker.run_pending();
    assert!(handler.recorder.take().is_empty());
}

#[test]
fn test_data_before_fin_is_delivered() {
    let mut s = setup();
    let sn = s.interface.init_port(80, Protocol::Tcp, s.recorder).unwrap();
    s.worker.run_pending();
    s.sim.lock().peer_connect(sn);
    s.interface.on_interrupt();
    s.worker.run_pending();
    s.recorder.take();

    s.sim.lock().peer_send(sn, b"last words");
    s.sim.lock().peer_disconnect(sn);
    s.interface.on_interrupt();
    s.worker.run_pending();
    assert_eq!(
        s.recorder.take(),
        [
            (0, Seen::Received(b"last words".to_vec(), None)),
            (0, Seen::Disconnected)
        ]
    );
    assert_eq!(s.sim.lock().status(sn), SocketStatus::Listen);
}

#[test]
fn test_service_requests_coalesce() {
    let mut s = setup();
    let sn = s.interface.init_port(80, Protocol::Tcp, s.recorder).unwrap();
    s.worker.run_pending();
    s.sim.lock().peer_connect(sn);

    // Far more signals than queue slots
    for _ in 0..(4 * QUEUE) {
        s.interface.on_interrupt();
    }
    s.interface.request_service().unwrap();
    assert_eq!(s.queue.len(), 1);
    assert_eq!(s.worker.run_pending(), 1);
    assert_eq!(s.recorder.take(), [(0, Seen::Connected)]);

    s.interface.on_interrupt();
    assert_eq!(s.queue.len(), 1);
}

fn connect_only(station: &mut TestStation, arg: usize) {
    let _ = station.chip().connect(arg as u8, PEER);
}

#[test]
fn test_interrupts_during_blocking_connect_coalesce() {
    let mut s = setup();
    s.worker
        .context_mut()
        .chip()
        .socket(2, Protocol::Tcp, 0, SocketFlags::NONE)
        .unwrap();
    s.sim.lock().set_connect_behavior(
        SocketId::new(2).unwrap(),
        ConnectBehavior::TimeoutAfter(4 * QUEUE as u32),
    );
    s.queue
        .try_request(Deferred::new(connect_only, 2))
        .unwrap();

    // The line keeps signalling while the worker is stuck in the connect
    let interface = s.interface;
    let connecting = SocketId::new(2).unwrap();
    s.sim.lock().set_hook(Box::new(move |state: &mut State| {
        if state.status(connecting) != SocketStatus::Closed {
            interface.on_interrupt();
        }
    }));

    assert_eq!(s.worker.run_pending(), 2);
    s.sim.lock().clear_hook();
    assert!(s.queue.is_empty());
}

#[test]
fn test_disconnect_relistens() {
    let mut s = setup();
    let sn = s.interface.init_port(80, Protocol::Tcp, s.recorder).unwrap();
    s.worker.run_pending();
    s.sim.lock().peer_connect(sn);
    s.interface.on_interrupt();
    s.worker.run_pending();

    s.sim.lock().peer_disconnect(sn);
    s.interface.on_interrupt();
    s.worker.run_pending();
    assert_eq!(
        s.recorder.take(),
        [(0, Seen::Connected), (0, Seen::Disconnected)]
    );
    assert_eq!(s.sim.lock().status(sn), SocketStatus::Listen);
    assert_eq!(s.registry.status(sn), SocketStatus::Listen);
    assert!(s.registry.is_in_use(sn));
}

#[test]
fn test_allocate_and_reuse() {
    let mut s = setup();
    let ids: Vec<SocketId> = (0..8)
        .map(|port| {
            s.interface
                .init_port(6000 + port, Protocol::Udp, s.recorder)
                .unwrap()
        })
        .collect();
    assert_eq!(ids, SocketId::all().collect::<Vec<_>>());
    assert_eq!(
        s.interface.init_port(7000, Protocol::Udp, s.recorder),
        Err(RequestError::Registry(RegistryError::NoFreeSocket))
    );
    s.worker.run_pending();

    let freed = SocketId::new(3).unwrap();
    s.interface.close(freed).unwrap();
    assert!(!s.registry.is_in_use(freed));
    assert_eq!(
        s.interface.init_port(7000, Protocol::Udp, s.recorder),
        Ok(freed)
    );

    // Close and reopen execute in request order
    assert_eq!(s.worker.run_pending(), 2);
    assert_eq!(s.sim.lock().status(freed), SocketStatus::Udp);
    assert_eq!(s.registry.binding(freed).map(|binding| binding.port), Some(7000));
    assert!(s.recorder.take().is_empty());
}

#[test]
fn test_failed_close_reclaims() {
    let mut s = setup();
    let sn = s.interface.init_port(5000, Protocol::Udp, s.recorder).unwrap();
    s.worker.run_pending();

    s.interface.close(sn).unwrap();
    assert!(!s.registry.is_in_use(sn));
    s.sim.lock().inject_fault();
    s.worker.run_pending();

    assert!(s.registry.is_in_use(sn));
    assert_eq!(
        s.recorder.take(),
        [(0, Seen::Error(Error::Transport(BusError::Transfer)))]
    );
}

#[test]
fn test_open_failure_reported() {
    let mut s = setup();
    let sn = s
        .interface
        .init_binding(Binding {
            protocol: Protocol::Udp,
            port: 5000,
            flags: SocketFlags::IGMP_VER2,
            handler: Some(s.recorder),
        })
        .unwrap();
    s.worker.run_pending();
    assert_eq!(s.recorder.take(), [(0, Seen::Error(Error::SocketFlag))]);
    assert_eq!(s.registry.status(sn), SocketStatus::Closed);
}

#[test]
fn test_unbound_open_rejected() {
    let s = setup();
    assert_eq!(
        s.interface.open(SocketId::MAX),
        Err(RequestError::Unbound)
    );
}

static ORDER: Mutex<Vec<usize>> = Mutex::new(Vec::new());
static CONNECT_RESULT: Mutex<Option<Result<(), Error>>> = Mutex::new(None);

const PEER: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 2), 8080);

fn connect_request(station: &mut TestStation, arg: usize) {
    let result = station.chip().connect(arg as u8, PEER);
    *CONNECT_RESULT.lock().unwrap() = Some(result);
    ORDER.lock().unwrap().push(0);
}

fn record_request(_station: &mut TestStation, arg: usize) {
    ORDER.lock().unwrap().push(arg);
}

#[test]
fn test_requests_wait_for_blocking_connect() {
    let mut s = setup();
    s.worker
        .context_mut()
        .chip()
        .socket(1, Protocol::Tcp, 0, SocketFlags::NONE)
        .unwrap();
    s.sim.lock().set_connect_behavior(
        SocketId::new(1).unwrap(),
        ConnectBehavior::TimeoutAfter(20),
    );
    s.queue
        .try_request(Deferred::new(connect_request, 1))
        .unwrap();

    // Three requests arrive while the worker is inside the connect
    let queue = s.queue;
    let mut queued = false;
    s.sim.lock().set_hook(Box::new(move |_state| {
        if !queued {
            queued = true;
            for arg in [1, 2, 3] {
                queue.try_request(Deferred::new(record_request, arg)).unwrap();
            }
        }
    }));

    assert_eq!(s.worker.run_pending(), 4);
    assert_eq!(*ORDER.lock().unwrap(), [0, 1, 2, 3]);
    assert_eq!(*CONNECT_RESULT.lock().unwrap(), Some(Err(Error::Timeout)));
    assert_eq!(s.sim.lock().status(SocketId::new(1).unwrap()), SocketStatus::Closed);
}

async fn run_worker(mut worker: TestWorker) {
    worker.run().await
}

#[test]
fn test_runner_services_interrupt_line() {
    let s = setup();
    let mut lines = InterruptLines::<'static, 2>::new();
    let interface: &'static TestInterface = Box::leak(Box::new(s.interface));
    lines.register(11, interface).ok().unwrap();

    let mut executor = LocalPool::new();
    executor
        .spawner()
        .spawn_local_obj(Box::new(run_worker(s.worker)).into())
        .unwrap();

    let sn = interface.init_port(80, Protocol::Tcp, s.recorder).unwrap();
    executor.run_until_stalled();
    assert_eq!(s.registry.status(sn), SocketStatus::Listen);

    s.sim.lock().peer_connect(sn);
    assert!(lines.dispatch(11));
    executor.run_until_stalled();
    assert_eq!(s.recorder.take(), [(0, Seen::Connected)]);
    assert!(s.queue.is_empty());
}
