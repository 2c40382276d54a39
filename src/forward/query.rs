use splitdns_proto::message::set_message_id;
use splitdns_proto::RecordType;
use std::net::SocketAddr;
use tokio::net::TcpStream;

/// How many 1 Hz ticks an unanswered query survives.
const QUERY_TTL_TICKS: u8 = 6;

/// Where the reply has to go.
#[derive(Debug)]
pub enum ClientHandle {
    /// Datagram client, answered from the listen socket.
    Udp(SocketAddr),
    /// Stream client, answered with one framed message on its own socket.
    /// Dropping the handle closes the connection.
    Tcp(TcpStream),
}

/// One in-flight client query.
#[derive(Debug)]
pub struct QueryContext {
    /// The id the client sent; restored into the reply.
    pub orig_id: u16,
    /// The id currently on the wire to an upstream.
    pub cur_id: u16,
    pub qname: String,
    pub qtype: RecordType,
    pub client: ClientHandle,
    /// The untouched client message. Upstream UDP legs re-send it with a
    /// remapped id, so anything beyond the question section passes through.
    pub raw: Vec<u8>,
    ttl: u8,
}

impl QueryContext {
    pub fn new(
        orig_id: u16,
        qname: String,
        qtype: RecordType,
        client: ClientHandle,
        raw: Vec<u8>,
    ) -> Self {
        Self {
            orig_id,
            cur_id: orig_id,
            qname,
            qtype,
            client,
            raw,
            ttl: QUERY_TTL_TICKS,
        }
    }
}

/// Fixed-capacity set of in-flight queries, keyed by the wire id. Lookups
/// are linear; the table is small and short-lived entries dominate.
pub struct QueryTable {
    slots: Vec<Option<QueryContext>>,
}

impl QueryTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Admit a query under a fresh unique wire id, stamped into its raw
    /// message. A full table hands the context back: the query is dropped,
    /// never queued.
    pub fn add(&mut self, mut ctx: QueryContext) -> Result<u16, QueryContext> {
        let Some(free) = self.slots.iter().position(|slot| slot.is_none()) else {
            return Err(ctx);
        };
        let id = self.fresh_id();
        ctx.cur_id = id;
        set_message_id(&mut ctx.raw, id);
        self.slots[free] = Some(ctx);
        Ok(id)
    }

    pub fn get(&self, id: u16) -> Option<&QueryContext> {
        self.slots.iter().flatten().find(|ctx| ctx.cur_id == id)
    }

    /// Move a context to a fresh unique wire id, restamping its raw message.
    /// Every upstream leg gets its own id.
    pub fn renew_id(&mut self, id: u16) -> Option<u16> {
        let fresh = self.fresh_id();
        let ctx = self
            .slots
            .iter_mut()
            .flatten()
            .find(|ctx| ctx.cur_id == id)?;
        ctx.cur_id = fresh;
        set_message_id(&mut ctx.raw, fresh);
        Some(fresh)
    }

    /// The single destruction point of a context. Replies whose id no longer
    /// resolves here are late or duplicated and get dropped by the caller.
    pub fn remove(&mut self, id: u16) -> Option<QueryContext> {
        let slot = self
            .slots
            .iter_mut()
            .find(|slot| slot.as_ref().map_or(false, |ctx| ctx.cur_id == id))?;
        slot.take()
    }

    /// Age every context; those that reach zero are dropped, closing any
    /// client stream still attached.
    pub fn tick(&mut self) {
        for slot in self.slots.iter_mut() {
            if let Some(ctx) = slot {
                ctx.ttl -= 1;
                if ctx.ttl == 0 {
                    tracing::debug!("query [{}] [{}] timed out", ctx.orig_id, ctx.qname);
                    *slot = None;
                }
            }
        }
    }

    /// A non-zero id not currently in use. The table holds far fewer than
    /// 2^16 entries, so the draw terminates quickly.
    fn fresh_id(&self) -> u16 {
        loop {
            let id: u16 = rand::random();
            if id != 0 && self.get(id).is_none() {
                return id;
            }
        }
    }
}
