//! End-to-end exchange scenarios: schema → registry → doit/dumpit over an
//! in-memory transport standing in for the kernel.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use ynlink::netlink::message::NLMSG_ALIGNTO;
use ynlink::netlink::{
    Connection, Encoder, Error, FamilyDef, Message, MessageDef, NlMsgHdr, NlMsgType, Result,
    Transport, Value,
};
use ynlink::schema::{self, Family};

const SEQ: u32 = 9;
const PID: u32 = 4242;

/// Scripted datagram transport with a fixed correlation pair.
struct StubSocket {
    datagrams: Mutex<VecDeque<Vec<u8>>>,
    sent: Mutex<Vec<Vec<u8>>>,
}

impl StubSocket {
    fn new(datagrams: Vec<Vec<u8>>) -> Self {
        Self {
            datagrams: Mutex::new(datagrams.into()),
            sent: Mutex::new(Vec::new()),
        }
    }
}

impl Transport for StubSocket {
    fn next_seq(&self) -> u32 {
        SEQ
    }

    fn pid(&self) -> u32 {
        PID
    }

    async fn send(&self, msg: &[u8]) -> Result<()> {
        self.sent.lock().unwrap().push(msg.to_vec());
        Ok(())
    }

    async fn recv(&self) -> Result<Vec<u8>> {
        self.datagrams
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::InvalidMessage("stub socket out of datagrams".into()))
    }
}

const LINK_DOC: &str = r#"
name: linktest
protocol: netlink-raw
protonum: 0

attribute-sets:
  - name: link-attrs
    attributes:
      - name: ifindex
        type: u32
      - name: ifname
        type: string

operations:
  list:
    - name: getlink
      value: 18
      attribute-set: link-attrs
      do:
        request:
          attributes: [ifindex]
        reply:
          attributes: [ifindex, ifname]
      dump:
        request:
          attributes: []
        reply:
          attributes: [ifindex, ifname]
"#;

fn registry() -> Arc<FamilyDef> {
    let family = Family::parse(LINK_DOC).unwrap();
    Arc::new(schema::build_family(&family).unwrap())
}

fn reply_def(registry: &FamilyDef) -> Arc<MessageDef> {
    registry
        .operation("getlink")
        .unwrap()
        .dumpit
        .as_ref()
        .unwrap()
        .reply
        .clone()
        .unwrap()
}

fn control_frame(msg_type: u16, payload: &[u8]) -> Vec<u8> {
    let mut enc = Encoder::new();
    enc.measure_u32(|e| {
        let mut header = NlMsgHdr::new(msg_type, 0);
        header.nlmsg_seq = SEQ;
        header.nlmsg_pid = PID;
        header.encode(e);
        e.put_bytes(payload);
        Ok(())
    })
    .unwrap();
    enc.align_to(NLMSG_ALIGNTO);
    enc.finish()
}

fn error_frame(errno: i32) -> Vec<u8> {
    control_frame(NlMsgType::ERROR, &errno.to_ne_bytes())
}

fn done_frame() -> Vec<u8> {
    control_frame(NlMsgType::DONE, &[])
}

fn reply_frame(def: &MessageDef, args: &[(&str, Value)]) -> Vec<u8> {
    let mut msg = Message::from_args(def, args).unwrap();
    msg.header.nlmsg_seq = SEQ;
    msg.header.nlmsg_pid = PID;
    let mut enc = Encoder::new();
    msg.encode(def, &mut enc).unwrap();
    enc.finish()
}

#[tokio::test]
async fn do_request_pure_ack() {
    let registry = registry();
    let conn = Connection::with_socket(registry, StubSocket::new(vec![error_frame(0)]));
    let reply = conn.doit("getlink", &[]).await.unwrap();
    assert!(reply.is_none());
}

#[tokio::test]
async fn do_request_kernel_error() {
    let registry = registry();
    let conn = Connection::with_socket(registry, StubSocket::new(vec![error_frame(-13)]));
    let err = conn.doit("getlink", &[]).await.unwrap_err();
    assert_eq!(err.errno(), Some(13)); // EACCES
    assert!(err.is_permission_denied());
    // Kernel errors are wrapped with the operation name.
    assert!(err.to_string().contains("getlink"));
}

#[tokio::test]
async fn dump_spans_receive_calls() {
    let registry = registry();
    let reply = reply_def(&registry);

    // Two payload frames in the first datagram, DONE alone in the second:
    // the receive loop must keep reading past the first recv call.
    let mut first = reply_frame(
        &reply,
        &[
            ("ifindex", Value::U32(1)),
            ("ifname", Value::String("lo".into())),
        ],
    );
    first.extend_from_slice(&reply_frame(
        &reply,
        &[
            ("ifindex", Value::U32(2)),
            ("ifname", Value::String("eth0".into())),
        ],
    ));
    let conn = Connection::with_socket(registry, StubSocket::new(vec![first, done_frame()]));

    let links = conn.dumpit("getlink", &[]).await.unwrap();
    assert_eq!(links.len(), 2);
    assert_eq!(links[0].get("ifname").unwrap().as_str(), Some("lo"));
    assert_eq!(links[1].get("ifname").unwrap().as_str(), Some("eth0"));
}

#[tokio::test]
async fn do_request_with_reply_payload() {
    let registry = registry();
    let reply = reply_def(&registry);
    let frame = reply_frame(
        &reply,
        &[
            ("ifindex", Value::U32(42)),
            ("ifname", Value::String("wg0".into())),
        ],
    );
    let conn = Connection::with_socket(registry, StubSocket::new(vec![frame]));

    let msg = conn
        .doit("getlink", &[("ifindex", Value::U32(42))])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(msg.get("ifindex").unwrap().as_u32(), Some(42));
    assert_eq!(msg.get("ifname").unwrap().as_str(), Some("wg0"));
}

#[tokio::test]
async fn dump_aborts_on_kernel_error() {
    let registry = registry();
    let reply = reply_def(&registry);
    let mut datagram = reply_frame(&reply, &[("ifindex", Value::U32(1))]);
    datagram.extend_from_slice(&error_frame(-16)); // EBUSY after a payload
    let conn = Connection::with_socket(registry, StubSocket::new(vec![datagram]));

    let err = conn.dumpit("getlink", &[]).await.unwrap_err();
    assert!(err.is_busy());
}

#[tokio::test]
async fn request_frame_shape_on_the_wire() {
    // The sent request is a well-formed frame: accurate length, REQUEST|ACK
    // (|DUMP for dumps), stamped correlation pair, 4-byte aligned.
    use ynlink::netlink::Decoder;
    use ynlink::netlink::message::{NLM_F_ACK, NLM_F_DUMP, NLM_F_REQUEST};

    let registry = registry();
    let stub = StubSocket::new(vec![done_frame()]);
    let conn = Connection::with_socket(registry, stub);
    conn.dumpit("getlink", &[]).await.unwrap();

    let sent = conn.socket().sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    let frame = &sent[0];
    assert_eq!(frame.len() % NLMSG_ALIGNTO, 0);

    let mut dec = Decoder::new(frame);
    let header = NlMsgHdr::decode(&mut dec).unwrap();
    assert_eq!(header.nlmsg_len as usize, frame.len());
    assert_eq!(header.nlmsg_type, 18);
    assert_eq!(header.nlmsg_flags, NLM_F_REQUEST | NLM_F_ACK | NLM_F_DUMP);
    assert_eq!(header.nlmsg_seq, SEQ);
    assert_eq!(header.nlmsg_pid, PID);
}

#[tokio::test]
async fn schema_argument_names_are_validated() {
    let registry = registry();
    let conn = Connection::with_socket(registry, StubSocket::new(vec![]));
    let err = conn
        .doit("getlink", &[("bogus", Value::U32(1))])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnknownAttribute { name } if name == "bogus"));
}
