pub mod analysis;
pub mod categorise;
pub mod collection;
pub mod core;
pub mod engine;
pub mod group;
pub mod jsonmanip;
pub mod logger;
pub mod pipeline;
pub mod schema;
pub mod spies;
pub mod tasks;

/*
┌──────────────────────────────────────────────────────────────────────────────┐
│                          STRATA STRUCT ARCHITECTURE                          │
└──────────────────────────────────────────────────────────────────────────────┘

┌────────────────────────────── SERVICE LAYER ─────────────────────────────────┐
│                                                                              │
│  ┌──────────────────────┐   ┌─────────────────────┐   ┌───────────────────┐  │
│  │ struct TaskManager   │   │ struct CollectionPool│  │ struct Logger     │  │
│  │ • processing queue   │   │ • readonly: Map<name,│  │ • bounded FIFO    │  │
│  │ • worker pool (N)    │   │   Vec<Collection>>   │  │ • drain thread    │  │
│  │ • per-coll writer    │   │ • writable: Map<name,│  │ • drop-newest     │  │
│  │   thread + queue     │   │   Option<Collection>>│  │   overflow count  │  │
│  │ • CheckPoints        │   │ • single mutex       │  └───────────────────┘  │
│  └──────────────────────┘   └─────────────────────┘                          │
│                                                                              │
│  ┌──────────────────────┐   ┌──────────────────────────────────────────────┐ │
│  │ struct CheckPoints   │   │ struct CollectionConfigs                     │ │
│  │ • id → CheckPoint    │   │ • name → CollectionConfig (deep-clone reads) │ │
│  │ • monotonic expiry   │   └──────────────────────────────────────────────┘ │
│  └──────────────────────┘                                                    │
└──────────────────────────────────────────────────────────────────────────────┘

┌───────────────────────────── COLLECTION LAYER ───────────────────────────────┐
│                                                                              │
│  Collection ──owns──> CollectionConfig ──holds──> Schema / Pipe /            │
│      │                                            Categoriser / Hierarchy    │
│      └────owns──> DbGroup ──manages──> control Fragment + frag<N> Fragments  │
│                                                                              │
│  Pipe ──applies──> Mapping (event-walk over input JSON) ──may call──>        │
│      Categoriser ──yields──> category labels                                 │
│                                                                              │
│  Schema.process ──emits──> engine::Document (terms, values, stored data)     │
│  Schema.perform_search ──builds──> engine::Query + spies::InfoHandlers       │
└──────────────────────────────────────────────────────────────────────────────┘

┌─────────────────────────────── ENGINE LAYER ─────────────────────────────────┐
│                                                                              │
│  WritableDatabase (one shard, atomic commit)                                 │
│  Database (union read view over shards)                                      │
│  matcher::run_match ──scores──> matches ──feeds──> MatchObserver spies       │
│  TermOccurSpy / TermCoOccurSpy ──aggregate──> results.info entries           │
└──────────────────────────────────────────────────────────────────────────────┘
*/
