//! End-to-end agent tests.
//!
//! These run whole agents in-process: real gRPC over loopback with
//! ephemeral ports, a static membership provider, and manual clocks
//! driving the status-update loops deterministically.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use meshmon_agent::{
    Agent, AgentClient, AgentConfig, AgentError, DialFn, ManualClock, Member, MemberState,
    MembershipProvider, StaticMembership,
};
use meshmon_cache::{Cache, InMemoryCache};
use meshmon_health::mock::{FixedChecker, HangingChecker};
use meshmon_health::Checker;
use meshmon_proto::{node_status, system_status};

const UPDATE_PERIOD: Duration = Duration::from_secs(1);
// Generous: manual clocks only reach it if a test advances that far.
const QUERY_TIMEOUT: Duration = Duration::from_secs(3600);

fn member(name: &str) -> Member {
    Member {
        name: name.to_string(),
        addr: "127.0.0.1".parse().unwrap(),
        port: 7946,
        state: MemberState::Alive,
        tags: HashMap::new(),
    }
}

/// Dial factory routing member names to in-process listener addresses.
fn routed_dial(routes: HashMap<String, SocketAddr>) -> DialFn {
    Arc::new(move |m: &Member| {
        let target = routes.get(&m.name).copied();
        let name = m.name.clone();
        Box::pin(async move {
            match target {
                Some(addr) => AgentClient::dial(addr.to_string()).await,
                None => Err(AgentError::Dial(format!("no route to {name}"))),
            }
        })
    })
}

async fn build_agent(
    name: &str,
    members: Vec<Member>,
    checkers: Vec<Arc<dyn Checker>>,
    clock: Arc<ManualClock>,
    dial: DialFn,
    cache: Arc<InMemoryCache>,
) -> Agent {
    let config = AgentConfig {
        name: name.to_string(),
        rpc_addrs: vec!["127.0.0.1:0".to_string()],
        membership_addr: "127.0.0.1:7373".to_string(),
        initial_peers: Vec::new(),
        tags: HashMap::new(),
        cache,
    };
    let membership = Arc::new(StaticMembership::new(name, members));
    let agent = Agent::new(config, membership)
        .await
        .expect("agent construction")
        .with_clock(clock)
        .with_dial(dial)
        .with_intervals(UPDATE_PERIOD, QUERY_TIMEOUT);
    for checker in checkers {
        agent.add_checker(checker).await;
    }
    agent
}

/// Advance the given clocks until `cond` holds.
async fn eventually(clocks: &[&ManualClock], mut cond: impl FnMut() -> bool) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        for clock in clocks {
            clock.advance(UPDATE_PERIOD);
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("condition not met before deadline");
}

#[tokio::test]
async fn two_node_cluster_aggregates_remote_failure() {
    let members = vec![member("a"), member("b")];

    // Node b: one failing probe.
    let clock_b = Arc::new(ManualClock::new());
    let cache_b = Arc::new(InMemoryCache::new());
    let mut agent_b = build_agent(
        "b",
        members.clone(),
        vec![Arc::new(FixedChecker::failing("kv", "connection refused"))],
        Arc::clone(&clock_b),
        routed_dial(HashMap::new()),
        cache_b,
    )
    .await;
    agent_b.start().unwrap();
    let addr_b = agent_b.rpc_addrs()[0];

    // Node a: healthy, dials b over loopback.
    let clock_a = Arc::new(ManualClock::new());
    let cache_a = Arc::new(InMemoryCache::new());
    let mut agent_a = build_agent(
        "a",
        members,
        vec![Arc::new(FixedChecker::healthy("ok"))],
        Arc::clone(&clock_a),
        routed_dial([("b".to_string(), addr_b)].into()),
        Arc::clone(&cache_a),
    )
    .await;
    agent_a.start().unwrap();

    let observe = Arc::clone(&cache_a);
    eventually(&[clock_a.as_ref(), clock_b.as_ref()], move || {
        let status = observe.recent_status().unwrap();
        status.nodes.len() == 2
            && status.nodes[0].status == node_status::Type::Healthy as i32
            && status.nodes[1].status == node_status::Type::Degraded as i32
    })
    .await;

    let status = cache_a.recent_status().unwrap();
    assert_eq!(status.status, system_status::Type::Degraded as i32);
    assert_eq!(status.nodes[0].name, "a");
    assert_eq!(status.nodes[1].name, "b");
    assert_eq!(status.nodes[1].probes[0].error, "connection refused");

    agent_a.close().await.unwrap();
    agent_b.close().await.unwrap();
}

#[tokio::test]
async fn local_status_rpc_serves_latest_snapshot() {
    let clock = Arc::new(ManualClock::new());
    let cache = Arc::new(InMemoryCache::new());
    let mut agent = build_agent(
        "a",
        vec![member("a")],
        vec![Arc::new(FixedChecker::healthy("ok"))],
        Arc::clone(&clock),
        routed_dial(HashMap::new()),
        Arc::clone(&cache),
    )
    .await;
    agent.start().unwrap();
    let addr = agent.rpc_addrs()[0];

    let observe = Arc::clone(&cache);
    eventually(&[clock.as_ref()], move || {
        observe.recent_status().unwrap().status == system_status::Type::Healthy as i32
    })
    .await;
    // Let any cycle triggered by the last advance settle.
    tokio::time::sleep(Duration::from_millis(20)).await;

    let mut client = AgentClient::dial(addr.to_string()).await.unwrap();

    // The RPC serves exactly the latest published snapshot, across
    // successive collections.
    for _ in 0..3 {
        let served = client.local_status().await.unwrap();
        let latest = agent.local_status().await;
        assert_eq!(served, latest);
        assert_eq!(served.status, node_status::Type::Healthy as i32);

        clock.advance(UPDATE_PERIOD);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    // The cluster view is served from the cache.
    let system = client.status().await.unwrap();
    assert_eq!(system, cache.recent_status().unwrap());

    agent.close().await.unwrap();
}

#[tokio::test]
async fn close_cancels_inflight_collection() {
    let clock = Arc::new(ManualClock::new());
    let cache = Arc::new(InMemoryCache::new());
    let mut agent = build_agent(
        "a",
        vec![member("a")],
        vec![Arc::new(HangingChecker::new("stuck"))],
        Arc::clone(&clock),
        routed_dial(HashMap::new()),
        cache,
    )
    .await;
    agent.start().unwrap();

    // Kick off a collection that will hang on the stuck checker.
    for _ in 0..5 {
        clock.advance(UPDATE_PERIOD);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // Close must cancel the in-flight cycle and return promptly.
    tokio::time::timeout(Duration::from_secs(5), agent.close())
        .await
        .expect("close should not hang")
        .expect("close should succeed");
}

#[tokio::test]
async fn start_twice_is_rejected() {
    let mut agent = build_agent(
        "a",
        vec![member("a")],
        Vec::new(),
        Arc::new(ManualClock::new()),
        routed_dial(HashMap::new()),
        Arc::new(InMemoryCache::new()),
    )
    .await;

    agent.start().unwrap();
    assert!(matches!(agent.start(), Err(AgentError::AlreadyStarted)));
    agent.close().await.unwrap();
}

#[tokio::test]
async fn close_before_start_is_rejected() {
    let mut agent = build_agent(
        "a",
        vec![member("a")],
        Vec::new(),
        Arc::new(ManualClock::new()),
        routed_dial(HashMap::new()),
        Arc::new(InMemoryCache::new()),
    )
    .await;

    assert!(matches!(agent.close().await, Err(AgentError::NotRunning)));
}

#[tokio::test]
async fn construction_registers_tags() {
    let membership: Arc<dyn MembershipProvider> =
        Arc::new(StaticMembership::new("a", vec![member("a")]));

    let config = AgentConfig {
        name: "a".to_string(),
        rpc_addrs: vec!["127.0.0.1:0".to_string()],
        membership_addr: "127.0.0.1:7373".to_string(),
        initial_peers: Vec::new(),
        tags: [("role".to_string(), "master".to_string())].into(),
        cache: Arc::new(InMemoryCache::new()),
    };

    let _agent = Agent::new(config, Arc::clone(&membership))
        .await
        .unwrap();

    let members = membership.members().await.unwrap();
    assert_eq!(members[0].tags.get("role").unwrap(), "master");
}

#[tokio::test]
async fn malformed_rpc_addr_is_a_config_error() {
    let config = AgentConfig {
        name: "a".to_string(),
        rpc_addrs: vec!["not-an-address".to_string()],
        membership_addr: "127.0.0.1:7373".to_string(),
        initial_peers: Vec::new(),
        tags: HashMap::new(),
        cache: Arc::new(InMemoryCache::new()),
    };
    let membership = Arc::new(StaticMembership::new("a", vec![member("a")]));

    let result = Agent::new(config, membership).await;
    assert!(matches!(result, Err(AgentError::Config(_))));
}
