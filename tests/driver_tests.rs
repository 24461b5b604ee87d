//! JSON-lines request loop tests

#![cfg(feature = "server")]

#[cfg(test)]
mod tests {
    use drawbridge::driver::{serve_requests, StreamEnd};
    use drawbridge::protocol::GateResponse;
    use drawbridge::{
        BlockPos, BlockState, BlockWorld, EngineConfig, GateEngine, GateState, MemoryGateStore,
        MemoryWorld,
    };
    use parking_lot::Mutex;
    use std::sync::Arc;

    const OWNER: &str = "00000000-0000-0000-0000-000000000001";

    fn engine() -> (Mutex<GateEngine>, Arc<MemoryWorld>) {
        let world = Arc::new(MemoryWorld::new());
        let store = Arc::new(MemoryGateStore::new());
        let engine = GateEngine::new(EngineConfig::default(), world.clone(), store);
        (Mutex::new(engine), world)
    }

    fn serve(engine: &Mutex<GateEngine>, input: &str) -> (StreamEnd, Vec<GateResponse>) {
        let mut out = Vec::new();
        let end = tokio_test::block_on(serve_requests(engine, input.as_bytes(), &mut out)).unwrap();
        let responses = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        (end, responses)
    }

    // -----------------------------------------------------------------------
    // Request loop
    // -----------------------------------------------------------------------

    #[test]
    fn create_and_toggle_over_the_wire() {
        let (engine, world) = engine();
        world.fill(
            "w",
            BlockPos::new(0, 64, 0),
            BlockPos::new(0, 65, 0),
            &BlockState::new("minecraft:stone"),
        );

        let create = format!(
            r#"{{"op":"create","actor":{{"id":"{OWNER}"}},"world":"w","corner1":{{"x":0,"y":64,"z":0}},"corner2":{{"x":0,"y":65,"z":0}}}}"#
        );
        let (end, responses) = serve(&engine, &create);
        assert_eq!(end, StreamEnd::Closed);
        let gate_id = match &responses[0] {
            GateResponse::Created(created) => {
                assert_eq!(created.blocks_captured, 2);
                created.gate_id
            }
            other => panic!("unexpected response {:?}", other),
        };

        let toggle = format!(
            r#"{{"op":"toggle_at","actor":{{"id":"{OWNER}"}},"world":"w","pos":{{"x":0,"y":64,"z":0}}}}"#
        );
        let (_, responses) = serve(&engine, &toggle);
        assert_eq!(
            responses[0],
            GateResponse::State {
                gate_id,
                state: GateState::Opening
            }
        );
        assert_eq!(engine.lock().stats().animating_gates, 1);
    }

    #[test]
    fn malformed_lines_get_error_responses() {
        let (engine, _) = engine();
        let (end, responses) = serve(&engine, "not json\n\n{\"op\":\"stats\"}\n");
        assert_eq!(end, StreamEnd::Closed);
        assert_eq!(responses.len(), 2);
        assert!(matches!(responses[0], GateResponse::Error { .. }));
        assert!(matches!(responses[1], GateResponse::Stats(_)));
    }

    #[test]
    fn engine_errors_are_reported() {
        let (engine, _) = engine();
        let line = format!(
            r#"{{"op":"toggle","actor":{{"id":"{OWNER}"}},"gate_id":"00000000-0000-0000-0000-0000000000ff"}}"#
        );
        let (_, responses) = serve(&engine, &line);
        match &responses[0] {
            GateResponse::Error { message } => assert!(message.contains("not found")),
            other => panic!("unexpected response {:?}", other),
        }
    }

    #[test]
    fn set_block_writes_into_the_world() {
        let (engine, world) = engine();
        let line = r#"{"op":"set_block","world":"w","pos":{"x":1,"y":2,"z":3},"block":"minecraft:dirt"}"#;
        let (_, responses) = serve(&engine, line);
        assert_eq!(
            responses[0],
            GateResponse::BlockSet {
                pos: BlockPos::new(1, 2, 3)
            }
        );
        assert_eq!(
            world.block_at("w", BlockPos::new(1, 2, 3)),
            BlockState::new("minecraft:dirt")
        );
    }

    #[test]
    fn shutdown_request_stops_the_loop() {
        let (engine, _) = engine();
        let input = "{\"op\":\"shutdown\"}\n{\"op\":\"stats\"}\n";
        let (end, responses) = serve(&engine, input);
        assert_eq!(end, StreamEnd::Shutdown);
        assert_eq!(responses, vec![GateResponse::ShutDown { saved: 0 }]);
    }
}
