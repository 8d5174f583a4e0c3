pub mod core;
pub mod analysis;
pub mod storage;
pub mod mvcc;
pub mod scoring;
pub mod search;

/*
┌──────────────────────────────────────────────────────────────────────────┐
│                          MNEMO STRUCT ARCHITECTURE                        │
└──────────────────────────────────────────────────────────────────────────┘

┌────────────────────────────── CORE LAYER ────────────────────────────────┐
│                                                                           │
│  struct MemoryStore                                                       │
│  ┌─────────────────────────────────────────────────────────────────────┐ │
│  │ config:  StoreConfig           // tunables                          │ │
│  │ layout:  StoreLayout           // directory structure               │ │
│  │ wal:     WriteAheadLog         // durability journal                │ │
│  │ shards:  ShardManager          // partitioned persistence           │ │
│  │ engine:  SearchEngine          // BM25-style ranking                │ │
│  │ decay:   DecayEngine           // importance decay + reinforcement  │ │
│  │ access:  AccessTracker         // per-record access boost           │ │
│  │ cache:   ReadCache             // LRU over ranked result sets       │ │
│  │ records: Vec<Record>           // live set = source of truth        │ │
│  └─────────────────────────────────────────────────────────────────────┘ │
│                                                                           │
└───────────────────────────────────────────────────────────────────────────┘

┌──────────────────────────── STORAGE LAYER ───────────────────────────────┐
│                                                                           │
│  ingest ──► WAL append (O(1), durable) ──► flush ──► shard files ──► WAL │
│                                            (atomic tmp+rename)     clear │
│                                                                           │
│  DirLock   : cross-process mutual exclusion (mkdir-based, stale-safe)    │
│  VersionTracker : optimistic read-modify-write for shared JSON files     │
│                                                                           │
└───────────────────────────────────────────────────────────────────────────┘

Search flow: query ──► ReadCache? ──► tokenize ──► BM25 + decay weighting
             ──► access-frequency re-rank ──► truncate ──► reinforce hits
*/
