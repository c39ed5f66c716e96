//! 管道装配与事件传播的行为契约。

use std::sync::Arc;

use parking_lot::Mutex;
use sluice_core::error::codes;
use sluice_core::{
    Eventual, Handler, HandlerAdapter, HandlerContext, InboundContext, InboundHandler,
    OutboundContext, OutboundHandler, Pipeline, SluiceError,
};

/// 记录事件到共享日志并原样转发的探针。
type EventLog = Arc<Mutex<Vec<String>>>;

struct TraceDuplex {
    name: &'static str,
    log: EventLog,
}

impl Handler for TraceDuplex {
    type Rin = u32;
    type Rout = u32;
    type Win = u32;
    type Wout = u32;

    fn on_read(&self, ctx: &HandlerContext<u32, u32>, msg: u32) {
        self.log.lock().push(format!("{}:read", self.name));
        ctx.fire_read(msg);
    }

    fn on_write(&self, ctx: &HandlerContext<u32, u32>, msg: u32) -> Eventual<()> {
        self.log.lock().push(format!("{}:write", self.name));
        ctx.fire_write(msg)
    }

    fn on_detach(&self, _ctx: &HandlerContext<u32, u32>) {
        self.log.lock().push(format!("{}:detach", self.name));
    }
}

struct TraceInbound {
    name: &'static str,
    log: EventLog,
}

impl InboundHandler for TraceInbound {
    type Rin = u32;
    type Rout = u32;

    fn on_read(&self, ctx: &InboundContext<u32>, msg: u32) {
        self.log.lock().push(format!("{}:read", self.name));
        ctx.fire_read(msg);
    }

    fn on_detach(&self, _ctx: &InboundContext<u32>) {
        self.log.lock().push(format!("{}:detach", self.name));
    }
}

struct TraceOutbound {
    name: &'static str,
    log: EventLog,
}

impl OutboundHandler for TraceOutbound {
    type Win = u32;
    type Wout = u32;

    fn on_write(&self, ctx: &OutboundContext<u32>, msg: u32) -> Eventual<()> {
        self.log.lock().push(format!("{}:write", self.name));
        ctx.fire_write(msg)
    }

    fn on_detach(&self, _ctx: &OutboundContext<u32>) {
        self.log.lock().push(format!("{}:detach", self.name));
    }
}

struct StringProducer;

impl InboundHandler for StringProducer {
    type Rin = u32;
    type Rout = String;

    fn on_read(&self, ctx: &InboundContext<String>, msg: u32) {
        ctx.fire_read(msg.to_string());
    }
}

fn log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

fn entries(log: &EventLog) -> Vec<String> {
    log.lock().clone()
}

#[test]
fn inbound_chain_visits_in_insertion_order() {
    let log = log();
    let pipeline = Pipeline::new();
    pipeline.add_back(TraceDuplex { name: "a", log: Arc::clone(&log) }).expect("add a");
    pipeline.add_back_inbound(TraceInbound { name: "b", log: Arc::clone(&log) }).expect("add b");
    pipeline.add_back_outbound(TraceOutbound { name: "c", log: Arc::clone(&log) }).expect("add c");
    pipeline.add_back(TraceDuplex { name: "d", log: Arc::clone(&log) }).expect("add d");
    pipeline.finalize().expect("finalize");

    pipeline.read(1u32).expect("read entry");
    assert_eq!(entries(&log), vec!["a:read", "b:read", "d:read"]);
}

#[test]
fn outbound_chain_visits_in_reverse_insertion_order() {
    let log = log();
    let pipeline = Pipeline::new();
    pipeline.add_back(TraceDuplex { name: "a", log: Arc::clone(&log) }).expect("add a");
    pipeline.add_back_outbound(TraceOutbound { name: "c", log: Arc::clone(&log) }).expect("add c");
    pipeline.add_back(TraceDuplex { name: "d", log: Arc::clone(&log) }).expect("add d");
    pipeline.finalize().expect("finalize");

    pipeline.write(9u32).expect("write entry");
    assert_eq!(entries(&log), vec!["d:write", "c:write", "a:write"]);
}

#[test]
fn add_front_places_handler_at_the_head_of_both_chains() {
    let log = log();
    let pipeline = Pipeline::new();
    pipeline.add_back(TraceDuplex { name: "mid", log: Arc::clone(&log) }).expect("add mid");
    pipeline.add_front(TraceDuplex { name: "head", log: Arc::clone(&log) }).expect("add head");
    pipeline.finalize().expect("finalize");

    pipeline.read(1u32).expect("read");
    pipeline.write(2u32).expect("write");
    assert_eq!(entries(&log), vec!["head:read", "mid:read", "mid:write", "head:write"]);
}

#[test]
fn finalize_rejects_inbound_type_mismatch() {
    let pipeline = Pipeline::new();
    pipeline.add_back_inbound(StringProducer).expect("add producer");
    pipeline
        .add_back_inbound(TraceInbound { name: "u32-consumer", log: log() })
        .expect("add consumer");
    let err = pipeline.finalize().expect_err("type mismatch must fail finalization");
    assert_eq!(err.code(), codes::PIPELINE_TYPE_MISMATCH);
    assert!(err.message().contains("StringProducer"), "error names the offending handler");
}

#[test]
fn identity_adapter_forwards_reads_to_the_tail() {
    let log = log();
    let pipeline = Pipeline::new();
    pipeline.add_back(HandlerAdapter::<u32, u32>::new()).expect("add identity");
    pipeline.add_back(TraceDuplex { name: "tail", log: Arc::clone(&log) }).expect("add tail");
    pipeline.finalize().expect("finalize");

    pipeline.read(7u32).expect("read");
    assert_eq!(entries(&log), vec!["tail:read"]);
}

#[test]
fn entry_points_require_a_matching_chain() {
    let pipeline = Pipeline::new();
    pipeline.add_back_outbound(TraceOutbound { name: "o", log: log() }).expect("add outbound");
    pipeline.finalize().expect("finalize");

    let err = pipeline.read(1u32).expect_err("no inbound chain");
    assert_eq!(err.code(), codes::PIPELINE_MISSING_CHAIN);

    let inbound_only = Pipeline::new();
    inbound_only.add_back_inbound(TraceInbound { name: "i", log: log() }).expect("add inbound");
    inbound_only.finalize().expect("finalize");
    let err = inbound_only.write(1u32).expect_err("no outbound chain");
    assert_eq!(err.code(), codes::PIPELINE_MISSING_CHAIN);
}

#[test]
fn entry_message_type_is_checked_against_the_head() {
    let pipeline = Pipeline::new();
    pipeline.add_back(TraceDuplex { name: "a", log: log() }).expect("add");
    pipeline.finalize().expect("finalize");
    let err = pipeline.read("wrong".to_string()).expect_err("entry type mismatch");
    assert_eq!(err.code(), codes::PIPELINE_ENTRY_TYPE);
}

#[test]
fn removing_a_missing_handler_is_an_error() {
    let pipeline = Pipeline::new();
    pipeline.add_back(TraceDuplex { name: "a", log: log() }).expect("add");
    let err = pipeline.remove::<HandlerAdapter<u32, u32>>().expect_err("absent handler");
    assert_eq!(err.code(), codes::PIPELINE_HANDLER_MISSING);
}

#[test]
fn remove_by_type_removes_every_occurrence() {
    let log = log();
    let pipeline = Pipeline::new();
    pipeline.add_back(TraceDuplex { name: "x", log: Arc::clone(&log) }).expect("add x");
    pipeline.add_back(HandlerAdapter::<u32, u32>::new()).expect("add id1");
    pipeline.add_back(HandlerAdapter::<u32, u32>::new()).expect("add id2");
    pipeline.remove::<HandlerAdapter<u32, u32>>().expect("remove both adapters");
    assert_eq!(pipeline.num_handlers(), 1);
    pipeline.finalize().expect("finalize");
    pipeline.read(3u32).expect("read");
    assert_eq!(entries(&log), vec!["x:read"]);
}

#[test]
fn frozen_pipeline_rejects_mutation() {
    let pipeline = Pipeline::new();
    pipeline.add_back(TraceDuplex { name: "a", log: log() }).expect("add");
    pipeline.finalize().expect("finalize");
    pipeline.freeze();
    let err = pipeline.add_back(HandlerAdapter::<u32, u32>::new()).expect_err("frozen");
    assert_eq!(err.code(), codes::PIPELINE_FROZEN);
    let err = pipeline.remove::<TraceDuplex>().expect_err("frozen remove");
    assert_eq!(err.code(), codes::PIPELINE_FROZEN);
}

/// 在 `on_read` 中丢弃外部最后一个管道强引用的 Handler。
struct DropsPipeline {
    slot: Arc<Mutex<Option<Arc<Pipeline>>>>,
    observed_alive: Arc<Mutex<Option<bool>>>,
    log: EventLog,
}

impl Handler for DropsPipeline {
    type Rin = u32;
    type Rout = u32;
    type Win = u32;
    type Wout = u32;

    fn on_read(&self, ctx: &HandlerContext<u32, u32>, msg: u32) {
        self.slot.lock().take();
        *self.observed_alive.lock() = Some(ctx.pipeline().is_some());
        ctx.fire_read(msg);
    }

    fn on_write(&self, ctx: &HandlerContext<u32, u32>, msg: u32) -> Eventual<()> {
        ctx.fire_write(msg)
    }

    fn on_detach(&self, _ctx: &HandlerContext<u32, u32>) {
        self.log.lock().push("dropper:detach".to_string());
    }
}

#[test]
fn pipeline_survives_propagation_and_detaches_in_reverse_order() {
    let log = log();
    let slot = Arc::new(Mutex::new(None));
    let observed_alive = Arc::new(Mutex::new(None));

    let pipeline = Pipeline::new();
    pipeline
        .add_back(DropsPipeline {
            slot: Arc::clone(&slot),
            observed_alive: Arc::clone(&observed_alive),
            log: Arc::clone(&log),
        })
        .expect("add dropper");
    pipeline.add_back(TraceDuplex { name: "tail", log: Arc::clone(&log) }).expect("add tail");
    pipeline.finalize().expect("finalize");

    let weak = Arc::downgrade(&pipeline);
    *slot.lock() = Some(pipeline);

    // 传播期间 Handler 丢弃唯一的外部强引用；调用经由临时升级的引用发起，
    // 管道必须活到调用返回之后。
    weak.upgrade().expect("pipeline alive before read").read(5u32).expect("read");

    assert_eq!(*observed_alive.lock(), Some(true), "pipeline stays alive mid-propagation");
    assert!(weak.upgrade().is_none(), "pipeline destroyed once the call returned");

    let final_log = entries(&log);
    assert_eq!(
        final_log,
        vec!["tail:read", "tail:detach", "dropper:detach"],
        "handlers detach in reverse insertion order exactly once"
    );
}

/// Handler 持有管道强引用会成环；owner 提名将其从析构解绑中排除。
struct OwningHandler {
    kept: Mutex<Option<Arc<Pipeline>>>,
    log: EventLog,
}

impl Handler for OwningHandler {
    type Rin = u32;
    type Rout = u32;
    type Win = u32;
    type Wout = u32;

    fn on_read(&self, ctx: &HandlerContext<u32, u32>, msg: u32) {
        ctx.fire_read(msg);
    }

    fn on_write(&self, ctx: &HandlerContext<u32, u32>, msg: u32) -> Eventual<()> {
        ctx.fire_write(msg)
    }

    fn on_detach(&self, _ctx: &HandlerContext<u32, u32>) {
        self.log.lock().push("owner:detach".to_string());
    }
}

#[test]
fn owner_handler_is_not_detached_during_destruction() {
    let log = log();
    let owner = Arc::new(OwningHandler { kept: Mutex::new(None), log: Arc::clone(&log) });
    let pipeline = Pipeline::new();
    pipeline.add_back_arc(Arc::clone(&owner)).expect("add owner");
    pipeline.add_back(TraceDuplex { name: "tail", log: Arc::clone(&log) }).expect("add tail");
    pipeline.finalize().expect("finalize");
    assert!(pipeline.set_owner(&owner), "owner nomination finds the handler");

    *owner.kept.lock() = Some(Arc::clone(&pipeline));
    drop(pipeline);
    // 此时管道仍被 owner 持有；释放 owner 的引用触发析构。
    owner.kept.lock().take();

    let final_log = entries(&log);
    assert_eq!(final_log, vec!["tail:detach"], "owner skipped, the rest detached");
}

#[test]
fn read_exception_travels_through_default_handlers() {
    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

    struct ErrorSink {
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl InboundHandler for ErrorSink {
        type Rin = u32;
        type Rout = u32;

        fn on_read(&self, _ctx: &InboundContext<u32>, _msg: u32) {}

        fn on_read_exception(&self, _ctx: &InboundContext<u32>, err: SluiceError) {
            self.seen.lock().push(err.code().to_string());
        }
    }

    let pipeline = Pipeline::new();
    pipeline.add_back(HandlerAdapter::<u32, u32>::new()).expect("add identity");
    pipeline.add_back_inbound(ErrorSink { seen: Arc::clone(&seen) }).expect("add sink");
    pipeline.finalize().expect("finalize");

    pipeline
        .read_exception(SluiceError::new(codes::TRANSPORT_READ_FAILED, "boom"))
        .expect("entry");
    assert_eq!(seen.lock().clone(), vec!["transport.read_failed"]);
}
