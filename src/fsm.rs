//! Implements the data-structures and algorithms described in the W3C SCXML
//! recommendation, adapted to a step-driven, single-threaded interpreter.
//! As reference, the core procedures carry the W3C pseudo-code names.
//! See [W3C:Algorithm for SCXML Interpretation](https://www.w3.org/TR/scxml/#AlgorithmforSCXMLInterpretation)

#![allow(non_snake_case)]

use std::collections::HashMap;
use std::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::hash::Hash;
use std::slice::Iter;
use std::str::FromStr;

use crate::common::error;
use crate::datamodel::{Data, Datamodel};
use crate::events::Event;
use crate::executable_content;
use crate::tracer::FiredRecord;

////////////////////////////////////////////////////////////////////////////////
// ## General Purpose Data types
// Structs and methods are designed to match the signatures in the W3C pseudo code.

/// ## General Purpose List type, as used in the W3C algorithm.
#[derive(Clone)]
pub struct List<T: Clone> {
    data: Vec<T>,
}

impl<T: Clone + PartialEq> Default for List<T> {
    fn default() -> Self {
        List::new()
    }
}

impl<T: Clone + PartialEq> List<T> {
    pub fn new() -> List<T> {
        List {
            data: Default::default(),
        }
    }

    /// Extension to create a list from an array.
    pub fn from_array(l: &[T]) -> List<T> {
        List { data: l.to_vec() }
    }

    /// Extension to return the current size of the list.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Extension to add an element at the end of the list.
    pub fn push(&mut self, t: T) {
        self.data.push(t);
    }

    /// *W3C says*: Returns the head of the list
    pub fn head(&self) -> &T {
        self.data.first().unwrap()
    }

    /// *W3C says*:
    /// Returns the tail of the list (i.e., the rest of the list once the head is removed)
    pub fn tail(&self) -> List<T> {
        let mut t = List {
            data: self.data.clone(),
        };
        t.data.remove(0);
        t
    }

    /// *W3C says*:
    /// Returns the list appended with l
    pub fn append_set(&self, l: &OrderedSet<T>) -> List<T> {
        let mut t = List {
            data: self.data.clone(),
        };
        for i in l.data.iter() {
            t.data.push((*i).clone());
        }
        t
    }

    /// *W3C says*:
    /// Returns the list of elements that satisfy the predicate f
    /// # Actual Implementation:
    /// Can't name the function "filter" because this gets in conflict with
    /// the pre-defined "filter" that is introduced by the Iterator trait.
    pub fn filter_by(&self, f: &dyn Fn(&T) -> bool) -> List<T> {
        let mut t = List::new();
        for i in self.data.iter() {
            if f(i) {
                t.data.push((*i).clone());
            }
        }
        t
    }

    /// *W3C says*:
    /// Returns true if some element in the list satisfies the predicate f.
    /// Returns false for an empty list.
    pub fn some(&self, f: &dyn Fn(&T) -> bool) -> bool {
        for si in &self.data {
            if f(si) {
                return true;
            }
        }
        false
    }

    /// *W3C says*:
    /// Returns true if every element in the list satisfies the predicate f.
    /// Returns true for an empty list.
    pub fn every(&self, f: &dyn Fn(&T) -> bool) -> bool {
        for si in &self.data {
            if !f(si) {
                return false;
            }
        }
        true
    }

    /// Returns a sorted copy of the list.
    pub fn sort<F>(&self, compare: &F) -> List<T>
    where
        F: Fn(&T, &T) -> std::cmp::Ordering + ?Sized,
    {
        let mut t = List {
            data: self.data.clone(),
        };
        t.data.sort_by(compare);
        t
    }

    /// Extension to support "for in" semantics.
    pub fn iterator(&self) -> Iter<'_, T> {
        self.data.iter()
    }

    /// Extension: a new OrderedSet with copies of the elements, duplicates
    /// removed.
    pub fn to_set(&self) -> OrderedSet<T> {
        let mut s = OrderedSet::new();
        for e in self.data.iter() {
            s.add(e.clone());
        }
        s
    }
}

/// Set datatype used by the algorithm.
/// *W3C says*:
/// Note that the algorithm assumes a Lisp-like semantics in which the empty
/// Set null is equivalent to boolean 'false' and all other entities are
/// equivalent to 'true'.
#[derive(Debug, Clone)]
pub struct OrderedSet<T> {
    pub(crate) data: Vec<T>,
}

impl<T: Clone + PartialEq> Default for OrderedSet<T> {
    fn default() -> Self {
        OrderedSet::new()
    }
}

impl<T: Clone + PartialEq> OrderedSet<T> {
    pub fn new() -> OrderedSet<T> {
        OrderedSet {
            data: Default::default(),
        }
    }

    /// Extension: The size (only informational)
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// *W3C says*:
    /// Adds e to the set if it is not already a member
    pub fn add(&mut self, e: T) {
        if !self.data.contains(&e) {
            self.data.push(e);
        }
    }

    /// *W3C says*:
    /// Deletes e from the set
    pub fn delete(&mut self, e: &T) {
        self.data.retain(|x| *x != *e);
    }

    /// *W3C says*:
    /// Adds all members of s that are not already members of the set
    pub fn union(&mut self, s: &OrderedSet<T>) {
        for si in &s.data {
            if !self.is_member(si) {
                self.add(si.clone());
            }
        }
    }

    /// *W3C says*:
    /// Is e a member of set?
    pub fn is_member(&self, e: &T) -> bool {
        self.data.contains(e)
    }

    /// *W3C says*:
    /// Returns true if some element in the set satisfies the predicate f.
    /// Returns false for an empty set.
    pub fn some(&self, f: &dyn Fn(&T) -> bool) -> bool {
        for si in &self.data {
            if f(si) {
                return true;
            }
        }
        false
    }

    /// *W3C says*:
    /// Returns true if every element in the set satisfies the predicate f.
    /// Returns true for an empty set.
    pub fn every(&self, f: &dyn Fn(&T) -> bool) -> bool {
        for si in &self.data {
            if !f(si) {
                return false;
            }
        }
        true
    }

    /// *W3C says*:
    /// Returns true if this set and set s have at least one member in common
    pub fn has_intersection(&self, s: &OrderedSet<T>) -> bool {
        for si in &self.data {
            if s.is_member(si) {
                return true;
            }
        }
        false
    }

    /// *W3C says*:
    /// Is the set empty?
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// *W3C says*:
    /// Remove all elements from the set (make it empty)
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// *W3C says*:
    /// Converts the set to a list that reflects the order in which elements
    /// were originally added.
    pub fn to_list(&self) -> List<T> {
        List {
            data: self.data.clone(),
        }
    }

    pub fn sort<F>(&self, compare: &F) -> List<T>
    where
        F: Fn(&T, &T) -> std::cmp::Ordering + ?Sized,
    {
        let mut t = List {
            data: self.data.clone(),
        };
        t.data.sort_by(compare);
        t
    }

    pub fn iterator(&self) -> Iter<'_, T> {
        self.data.iter()
    }
}

/// *W3C says*:
/// table[foo] returns the value associated with foo.
/// table[foo] = bar sets the value associated with foo to be bar.
/// # Actual implementation:
/// Instead of the operators, methods are used.
#[derive(Debug, Default)]
pub struct HashTable<K, T> {
    data: HashMap<K, T>,
}

impl<K: Eq + Hash + Clone, T: Clone> HashTable<K, T> {
    pub fn new() -> HashTable<K, T> {
        HashTable {
            data: HashMap::new(),
        }
    }

    /// Extension to re-use existing instances.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn put(&mut self, k: K, v: &T) {
        self.data.insert(k, v.clone());
    }

    pub fn put_move(&mut self, k: K, v: T) {
        self.data.insert(k, v);
    }

    pub fn put_all(&mut self, t: &HashTable<K, T>) {
        for (k, v) in &t.data {
            self.data.insert(k.clone(), v.clone());
        }
    }

    pub fn has(&self, k: &K) -> bool {
        self.data.contains_key(k)
    }

    pub fn get(&self, k: &K) -> &T {
        self.data.get(k).unwrap()
    }
}

/////////////////////////////////////////////////////////////
// FSM model (State etc, representing the document)

pub type Name = String;
pub type StateId = u32;
pub type DocumentId = u32;
pub type ExecutableContentId = u32;
pub type TransitionId = u32;
pub type InvokeId = String;
pub type SessionId = u32;
pub type StateNameMap = HashMap<Name, StateId>;
pub type TransitionMap = HashMap<TransitionId, Transition>;

/// Datamodel binding type.
/// See [W3C SCXML Data Binding](https://www.w3.org/TR/scxml/#DataBinding)
#[derive(Debug, Clone, PartialEq, Copy)]
pub enum BindingType {
    Early,
    Late,
}

impl FromStr for BindingType {
    type Err = ();

    fn from_str(input: &str) -> Result<BindingType, Self::Err> {
        match input.to_lowercase().as_str() {
            "" | "early" => Ok(BindingType::Early),
            "late" => Ok(BindingType::Late),
            _ => Err(()),
        }
    }
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum HistoryType {
    Shallow,
    Deep,
    None,
}

pub fn map_history_type(ts: &str) -> HistoryType {
    match ts.to_lowercase().as_str() {
        "deep" => HistoryType::Deep,
        "" | "shallow" => HistoryType::Shallow,
        _ => {
            error!("Unknown history type '{}', using 'shallow'", ts);
            HistoryType::Shallow
        }
    }
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum TransitionType {
    Internal,
    External,
}

pub fn map_transition_type(ts: &str) -> TransitionType {
    match ts.to_lowercase().as_str() {
        "internal" => TransitionType::Internal,
        _ => TransitionType::External,
    }
}

/// Content of a `<content>` child, either literal (stored as JSON text) or
/// an expression.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct CommonContent {
    pub content: Option<String>,
    pub content_expr: Option<String>,
}

/// Stores `<param>` elements for `<send>`, `<donedata>` or `<invoke>`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Parameter {
    pub name: String,
    pub expr: String,
    pub location: String,
}

/// `<donedata>` of a final state.
#[derive(Clone, Debug, Default)]
pub struct DoneData {
    pub content: Option<CommonContent>,
    pub params: Option<Vec<Parameter>>,
}

/// *W3C says*:
/// The `<invoke>` element is used to create an instance of an external service.
#[derive(Clone, Debug)]
pub struct Invoke {
    pub doc_id: DocumentId,

    /// Attribute 'type' / 'typeexpr'.
    pub type_name: String,
    pub type_expr: String,

    /// Attribute 'src' / 'srcexpr'.
    pub src: String,
    pub src_expr: String,

    /// Attribute 'id'. Generated when empty.
    pub invoke_id: String,

    /// Attribute 'idlocation'. A location to store the generated id.
    pub external_id_location: String,

    /// Attribute 'namelist': data model locations copied into the payload.
    pub name_list: Vec<String>,

    /// *W3C says*:
    /// A flag indicating whether to forward events to the invoked process.
    pub autoforward: bool,

    /// `<param>` children.
    pub params: Option<Vec<Parameter>>,

    /// `<content>` child, for inline charts.
    pub content: Option<CommonContent>,

    /// *W3C says*:
    /// Executable content to massage the data returned from the invoked
    /// component.
    pub finalize: ExecutableContentId,

    pub parent_state_name: String,
}

impl Invoke {
    pub fn new() -> Invoke {
        Invoke {
            doc_id: 0,
            type_name: String::new(),
            type_expr: String::new(),
            src: String::new(),
            src_expr: String::new(),
            invoke_id: String::new(),
            external_id_location: String::new(),
            name_list: Vec::new(),
            autoforward: false,
            params: None,
            content: None,
            finalize: 0,
            parent_state_name: String::new(),
        }
    }
}

impl Default for Invoke {
    fn default() -> Self {
        Invoke::new()
    }
}

/// Stores all data of a state. In this model "State" is used for the SCXML
/// elements "state", "parallel", "final" and "history".
///
/// ## Definitions:
/// - An atomic state is a state with no child states.
/// - A compound state is a `<state>` with at least one child state.
/// - The default initial state(s) of a compound state are those specified
///   by the 'initial' attribute or `<initial>` element, if either is
///   present. Otherwise it is the state's first child state in document
///   order.
pub struct State {
    /// The internal id (not W3C). Index+1 of the state in Fsm.states.
    pub id: StateId,

    /// The unique id, counting in document order.
    pub doc_id: DocumentId,

    /// The SCXML id.
    pub name: String,

    /// The initial transition id (if the state has sub-states).
    pub initial: TransitionId,

    /// The ids of the sub-states of this state.
    pub states: Vec<StateId>,

    /// True for "parallel" states.
    pub is_parallel: bool,

    /// True for "final" states.
    pub is_final: bool,

    pub history_type: HistoryType,

    /// Content executed if the state is entered.
    pub onentry: ExecutableContentId,

    /// Content executed if the state is left.
    pub onexit: ExecutableContentId,

    /// Outgoing transitions, in document order.
    pub transitions: Vec<TransitionId>,

    pub invoke: Vec<Invoke>,
    pub history: Vec<StateId>,

    /// The local datamodel declarations, in document order.
    pub data: Vec<(String, Data)>,

    /// True if the state was never entered before.
    pub is_first_entry: bool,

    pub parent: StateId,
    pub donedata: Option<DoneData>,
}

impl State {
    pub fn new(name: &str) -> State {
        State {
            id: 0,
            doc_id: 0,
            name: name.to_string(),
            initial: 0,
            states: vec![],
            onentry: 0,
            onexit: 0,
            transitions: Vec::new(),
            is_parallel: false,
            is_final: false,
            history_type: HistoryType::None,
            data: Vec::new(),
            is_first_entry: true,
            parent: 0,
            donedata: None,
            invoke: Vec::new(),
            history: Vec::new(),
        }
    }
}

impl Display for State {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "<{}> #{}", self.name, self.id)
    }
}

/// A state to state transition, with references to the content that shall
/// be executed with it.
#[derive(Debug)]
pub struct Transition {
    pub id: TransitionId,
    pub doc_id: DocumentId,

    /// Event descriptors as authored, possibly with trailing `.*` or `*`.
    pub events: Vec<String>,
    pub cond: Option<String>,
    pub source: StateId,
    pub target: Vec<StateId>,
    pub transition_type: TransitionType,
    pub content: ExecutableContentId,

    /// Cleared in lax mode when a target could not be resolved.
    pub selectable: bool,
}

impl PartialEq for Transition {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Transition {
    pub fn new() -> Transition {
        Transition {
            id: 0,
            doc_id: 0,
            events: vec![],
            cond: None,
            source: 0,
            target: vec![],
            transition_type: TransitionType::External,
            content: 0,
            selectable: true,
        }
    }

    /// Matches an event name against the descriptors of this transition.
    /// A descriptor matches if it equals the name or is a proper
    /// dotted-prefix of it; `*` matches everything and a trailing `.*` is
    /// equivalent to the bare prefix. `a.b` matches `a.b.c` but not `a.bc`.
    pub fn nameMatch(&self, name: &str) -> bool {
        for descriptor in &self.events {
            if descriptor == "*" {
                return true;
            }
            let mut token = descriptor.as_str();
            if let Some(stripped) = token.strip_suffix(".*") {
                token = stripped;
            }
            let token = token.strip_suffix('.').unwrap_or(token);
            if token.is_empty() {
                continue;
            }
            if name == token
                || (name.starts_with(token) && name[token.len()..].starts_with('.'))
            {
                return true;
            }
        }
        false
    }
}

impl Default for Transition {
    fn default() -> Self {
        Transition::new()
    }
}

impl Display for Transition {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{#{} {:?} events:{:?} target:{:?}}}",
            self.id, self.transition_type, self.events, self.target
        )
    }
}

/// The statechart model plus the interpretation algorithm. The runtime
/// state (configuration, queues, history, data) lives in
/// [crate::datamodel::GlobalData], owned by the [Datamodel] passed into
/// every procedure.
pub struct Fsm {
    pub datamodel: String,
    pub binding: BindingType,
    pub version: String,
    pub name: String,

    /// An FSM can have multiple initial target states, so this state may be
    /// artificial. It also serves as the "scxml" element.
    pub pseudo_root: StateId,

    /// The only real storage of states; a state id is the one-based index
    /// into this vector.
    pub states: Vec<State>,
    pub state_names: StateNameMap,
    pub transitions: TransitionMap,
    pub executable_content: HashMap<ExecutableContentId, Vec<executable_content::Action>>,

    /// Global `<script>` element, executed only in unsafe-script mode.
    pub script: ExecutableContentId,

    pub generate_id_count: u32,
}

impl Debug for Fsm {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Fsm{{v:{} root:{} states:{}}}",
            self.version,
            self.pseudo_root,
            self.states.len()
        )
    }
}

impl Default for Fsm {
    fn default() -> Self {
        Fsm::new()
    }
}

impl Fsm {
    pub fn new() -> Fsm {
        Fsm {
            datamodel: String::new(),
            binding: BindingType::Early,
            version: "1.0".to_string(),
            name: String::new(),
            pseudo_root: 0,
            states: Vec::new(),
            state_names: StateNameMap::new(),
            transitions: TransitionMap::new(),
            executable_content: HashMap::new(),
            script: 0,
            generate_id_count: 0,
        }
    }

    /// Gets a state by id. The id MUST exist.
    pub fn get_state_by_id(&self, state_id: StateId) -> &State {
        &self.states[(state_id - 1) as usize]
    }

    /// Gets a mutable state by id. The id MUST exist.
    pub fn get_state_by_id_mut(&mut self, state_id: StateId) -> &mut State {
        &mut self.states[(state_id - 1) as usize]
    }

    pub fn get_transition_by_id(&self, transition_id: TransitionId) -> &Transition {
        self.transitions.get(&transition_id).unwrap()
    }

    pub fn state_name(&self, state_id: StateId) -> &str {
        self.get_state_by_id(state_id).name.as_str()
    }

    pub fn state_document_order(&self, sid1: &StateId, sid2: &StateId) -> std::cmp::Ordering {
        let d1 = self.get_state_by_id(*sid1).doc_id;
        let d2 = self.get_state_by_id(*sid2).doc_id;
        d1.cmp(&d2)
    }

    fn state_entry_order(&self, s1: &StateId, s2: &StateId) -> std::cmp::Ordering {
        // Same as document order
        self.state_document_order(s1, s2)
    }

    fn state_exit_order(&self, s1: &StateId, s2: &StateId) -> std::cmp::Ordering {
        // Reverse document order
        self.state_document_order(s2, s1)
    }

    fn transition_document_order(&self, t1: &&Transition, t2: &&Transition) -> std::cmp::Ordering {
        t1.doc_id.cmp(&t2.doc_id)
    }

    pub fn invoke_document_order(i1: &Invoke, i2: &Invoke) -> std::cmp::Ordering {
        i1.doc_id.cmp(&i2.doc_id)
    }

    /// Ancestor chain of a state, innermost first, up to and including the
    /// pseudo root. Used as the lookup scope for expressions evaluated in
    /// the context of that state.
    pub fn scope_chain(&self, sid: StateId) -> Vec<StateId> {
        let mut chain = Vec::new();
        let mut current = sid;
        while current != 0 {
            chain.push(current);
            current = self.get_state_by_id(current).parent;
        }
        chain
    }

    fn set_scope(&self, datamodel: &mut dyn Datamodel, sid: StateId) {
        datamodel.global().scope = self.scope_chain(sid);
    }

    /// *W3C says*:
    /// The purpose of this procedure is to initialize the interpreter and
    /// to start processing: initialize the global data structures and the
    /// data model, execute the global script element (only in unsafe-script
    /// mode here), then call enterStates on the initial configuration and
    /// complete the first macrostep.
    pub fn start(&mut self, datamodel: &mut dyn Datamodel) {
        if !self.valid() {
            self.failWithError(datamodel);
            return;
        }
        {
            let global = datamodel.global();
            global.running = true;
            global.state_names = self.state_names.clone();
        }
        // Root declarations always initialize at start; with early binding
        // every state frame is populated now as well.
        datamodel.initializeDataModel(self, self.pseudo_root);
        if self.binding == BindingType::Early {
            let all_ids: Vec<StateId> = self
                .states
                .iter()
                .filter(|s| s.id != self.pseudo_root && !s.data.is_empty())
                .map(|s| s.id)
                .collect();
            for sid in all_ids {
                datamodel.initializeDataModel(self, sid);
                self.get_state_by_id_mut(sid).is_first_entry = false;
            }
        }

        if self.script != 0 && datamodel.global().allow_unsafe_script {
            self.executeContent(datamodel, self.script);
        }

        let mut initialStates = List::new();
        let initial_transition = self.get_state_by_id(self.pseudo_root).initial;
        if initial_transition != 0 {
            initialStates.push(initial_transition);
        }
        self.enterStates(datamodel, &initialStates);
        self.macrostep(datamodel);
    }

    /// Checks basic referential integrity of the model.
    fn valid(&self) -> bool {
        for state in &self.states {
            if state.doc_id == 0 {
                error!("Referenced state '{}' is not declared", state.name);
                return false;
            }
        }
        true
    }

    fn failWithError(&self, datamodel: &mut dyn Datamodel) {
        error!("FSM has failed");
        datamodel.global().running = false;
    }

    /// Completes the current macrostep: repeatedly takes eventless
    /// transitions and transitions triggered by internal events until the
    /// internal queue is drained, then starts the invocations of all states
    /// that were entered and stayed active. Derived from the inner loop of
    /// the W3C `mainEventLoop`; the blocking wait for external events is
    /// replaced by the step API of the runtime.
    pub fn macrostep(&mut self, datamodel: &mut dyn Datamodel) {
        loop {
            let mut macrostepDone = false;
            while !macrostepDone {
                if !datamodel.global().running {
                    break;
                }
                let mut event_for_step: Option<Event> = None;
                let mut enabledTransitions = self.selectEventlessTransitions(datamodel);
                if enabledTransitions.is_empty() {
                    if datamodel.global().internal_queue.is_empty() {
                        macrostepDone = true;
                    } else {
                        let internalEvent =
                            datamodel.global().internal_queue.dequeue().unwrap();
                        datamodel.set_event(&internalEvent);
                        enabledTransitions = self.selectTransitions(datamodel, &internalEvent);
                        event_for_step = Some(internalEvent);
                    }
                }
                if !enabledTransitions.is_empty() {
                    self.microstep(
                        datamodel,
                        &enabledTransitions.to_list(),
                        event_for_step.as_ref(),
                    );
                }
            }
            if !datamodel.global().running {
                self.exitInterpreter(datamodel);
                return;
            }
            // Here we invoke whatever needs to be invoked.
            let sortedStatesToInvoke = datamodel
                .global()
                .states_to_invoke
                .sort(&|s1, s2| self.state_entry_order(s1, s2));
            datamodel.global().states_to_invoke.clear();
            for sid in sortedStatesToInvoke.iterator() {
                let mut invokes = self.get_state_by_id(*sid).invoke.clone();
                invokes.sort_by(Fsm::invoke_document_order);
                for inv in &invokes {
                    crate::invoke::start_invoke(self, datamodel, inv, *sid);
                }
            }
            // Invoking may have raised internal events; iterate to handle them.
            if datamodel.global().internal_queue.is_empty() {
                return;
            }
        }
    }

    /// Processes one external event: apply finalize and autoforward
    /// handling for active invocations, then select and take the enabled
    /// transitions and complete the macrostep.
    pub fn deliver(&mut self, datamodel: &mut dyn Datamodel, externalEvent: Event) {
        if !datamodel.global().running {
            return;
        }
        crate::invoke::before_transition_processing(self, datamodel, &externalEvent);
        if !datamodel.global().running {
            self.exitInterpreter(datamodel);
            return;
        }
        datamodel.set_event(&externalEvent);
        let enabledTransitions = self.selectTransitions(datamodel, &externalEvent);
        if !enabledTransitions.is_empty() {
            self.microstep(
                datamodel,
                &enabledTransitions.to_list(),
                Some(&externalEvent),
            );
        }
        self.macrostep(datamodel);
    }

    /// *W3C says*:
    /// # procedure exitInterpreter()
    /// The purpose of this procedure is to exit the current SCXML process
    /// by exiting all active states. If the machine is in a top-level final
    /// state, a Done event is generated.
    fn exitInterpreter(&mut self, datamodel: &mut dyn Datamodel) {
        let statesToExit;
        {
            let global = datamodel.global();
            let mut fc: Vec<StateId> = global.configuration.to_list().data.clone();
            fc.sort_by(|a, b| self.state_document_order(a, b));
            global.final_configuration =
                Some(fc.iter().map(|sid| self.state_name(*sid).to_string()).collect());
            statesToExit = global
                .configuration
                .to_list()
                .sort(&|s1, s2| self.state_exit_order(s1, s2));
        }
        for sid in statesToExit.iterator() {
            crate::invoke::cancel_invocations_for_state(datamodel, *sid);
            let onExitId = self.get_state_by_id(*sid).onexit;
            if onExitId != 0 {
                self.set_scope(datamodel, *sid);
                self.executeContent(datamodel, onExitId);
            }
            datamodel.global().configuration.delete(sid);
        }
    }

    /// *W3C says*:
    /// # function selectEventlessTransitions()
    /// This function selects all transitions that are enabled in the
    /// current configuration that do not require an event trigger. First
    /// find a transition with no 'event' attribute whose condition
    /// evaluates to true. If multiple matching transitions are present,
    /// take the first in document order. If none are present, search in the
    /// state's ancestors in ancestry order until one is found.
    fn selectEventlessTransitions(
        &self,
        datamodel: &mut dyn Datamodel,
    ) -> OrderedSet<TransitionId> {
        let mut enabledTransitions: OrderedSet<TransitionId> = OrderedSet::new();
        let atomicStates = datamodel
            .global()
            .configuration
            .to_list()
            .filter_by(&|sid| self.isAtomicState(*sid))
            .sort(&|s1, s2| self.state_document_order(s1, s2));
        for sid in atomicStates.iterator() {
            let mut condT = Vec::new();
            let chain = List::from_array(&[*sid]).append_set(&self.getProperAncestors(*sid, 0));
            for s in chain.iterator() {
                let state = self.get_state_by_id(*s);
                let mut transitions: Vec<&Transition> = state
                    .transitions
                    .iter()
                    .map(|tid| self.get_transition_by_id(*tid))
                    .collect();
                transitions.sort_by(|t1, t2| self.transition_document_order(t1, t2));
                for t in transitions {
                    if t.selectable && t.events.is_empty() {
                        condT.push(t.id);
                    }
                }
            }
            for ct in condT {
                if self.conditionMatch(datamodel, ct) {
                    enabledTransitions.add(ct);
                    break;
                }
            }
        }
        self.removeConflictingTransitions(datamodel, &enabledTransitions)
    }

    /// *W3C says*:
    /// # function selectTransitions(event)
    /// The purpose of the selectTransitions() procedure is to collect the
    /// transitions that are enabled by this event in the current
    /// configuration.
    fn selectTransitions(
        &self,
        datamodel: &mut dyn Datamodel,
        event: &Event,
    ) -> OrderedSet<TransitionId> {
        let mut enabledTransitions: OrderedSet<TransitionId> = OrderedSet::new();
        let atomicStates = datamodel
            .global()
            .configuration
            .to_list()
            .filter_by(&|sid| self.isAtomicState(*sid))
            .sort(&|s1, s2| self.state_document_order(s1, s2));
        for sid in atomicStates.iterator() {
            let mut condT = Vec::new();
            let chain = List::from_array(&[*sid]).append_set(&self.getProperAncestors(*sid, 0));
            for s in chain.iterator() {
                let state = self.get_state_by_id(*s);
                let mut transitions: Vec<&Transition> = state
                    .transitions
                    .iter()
                    .map(|tid| self.get_transition_by_id(*tid))
                    .collect();
                transitions.sort_by(|t1, t2| self.transition_document_order(t1, t2));
                for t in transitions {
                    if t.selectable && !t.events.is_empty() && t.nameMatch(&event.name) {
                        condT.push(t.id);
                    }
                }
            }
            for ct in condT {
                if self.conditionMatch(datamodel, ct) {
                    enabledTransitions.add(ct);
                    break;
                }
            }
        }
        self.removeConflictingTransitions(datamodel, &enabledTransitions)
    }

    /// *W3C says*:
    /// # function removeConflictingTransitions(enabledTransitions)
    /// enabledTransitions will contain multiple transitions only if a
    /// parallel state is active. Transitions conflict when their exit sets
    /// intersect; the transition selected by the earlier state in document
    /// order wins, unless the later one's source is a descendant of the
    /// earlier one's source. Targetless transitions have empty exit sets
    /// and thus do not conflict with any other transitions.
    fn removeConflictingTransitions(
        &self,
        datamodel: &mut dyn Datamodel,
        enabledTransitions: &OrderedSet<TransitionId>,
    ) -> OrderedSet<TransitionId> {
        let mut filteredTransitions: OrderedSet<TransitionId> = OrderedSet::new();
        for tid1 in enabledTransitions.to_list().iterator() {
            let t1 = self.get_transition_by_id(*tid1);
            let mut t1Preempted = false;
            let mut transitionsToRemove = OrderedSet::new();
            let filteredTransitionList = filteredTransitions.to_list();
            for tid2 in filteredTransitionList.iterator() {
                if self
                    .computeExitSet(datamodel, &List::from_array(&[*tid1]))
                    .has_intersection(&self.computeExitSet(datamodel, &List::from_array(&[*tid2])))
                {
                    let t2 = self.get_transition_by_id(*tid2);
                    if self.isDescendant(t1.source, t2.source) {
                        transitionsToRemove.add(*tid2);
                    } else {
                        t1Preempted = true;
                        break;
                    }
                }
            }
            if !t1Preempted {
                for t3 in transitionsToRemove.to_list().iterator() {
                    filteredTransitions.delete(t3);
                }
                filteredTransitions.add(*tid1);
            }
        }
        filteredTransitions
    }

    /// *W3C says*:
    /// # procedure microstep(enabledTransitions)
    /// The purpose of the microstep procedure is to process a single set of
    /// transitions. The processing of the enabled transitions must be done
    /// in lock step: their source states must first be exited, then their
    /// actions must be executed, and finally their target states entered.
    fn microstep(
        &mut self,
        datamodel: &mut dyn Datamodel,
        enabledTransitions: &List<TransitionId>,
        event: Option<&Event>,
    ) {
        for tid in enabledTransitions.iterator() {
            let t = self.get_transition_by_id(*tid);
            let record = FiredRecord {
                source: self.state_name(t.source).to_string(),
                targets: t
                    .target
                    .iter()
                    .map(|sid| self.state_name(*sid).to_string())
                    .collect(),
                event: event.map(|e| e.name.clone()),
                cond: t.cond.clone(),
            };
            datamodel.global().step.fired.push(record);
        }
        self.exitStates(datamodel, enabledTransitions);
        self.executeTransitionContent(datamodel, enabledTransitions);
        self.enterStates(datamodel, enabledTransitions);
    }

    /// *W3C says*:
    /// # procedure exitStates(enabledTransitions)
    /// Compute the set of states to exit, record the history of exited
    /// states, then exit them in exit order. Invocations of an exited state
    /// are cancelled before its onexit handlers run.
    fn exitStates(&mut self, datamodel: &mut dyn Datamodel, enabledTransitions: &List<TransitionId>) {
        let statesToExit = self.computeExitSet(datamodel, enabledTransitions);
        {
            let global = datamodel.global();
            for s in statesToExit.iterator() {
                global.states_to_invoke.delete(s);
            }
        }
        let statesToExitSorted = statesToExit.sort(&|s1, s2| self.state_exit_order(s1, s2));

        // Record history before anything is exited.
        let mut ahistory: HashTable<StateId, OrderedSet<StateId>> = HashTable::new();
        for sid in statesToExitSorted.iterator() {
            let s = self.get_state_by_id(*sid);
            for hid in &s.history {
                let h = self.get_state_by_id(*hid);
                let memory = if h.history_type == HistoryType::Deep {
                    datamodel
                        .global()
                        .configuration
                        .to_list()
                        .filter_by(&|s0| self.isAtomicState(*s0) && self.isDescendant(*s0, s.id))
                        .to_set()
                } else {
                    datamodel
                        .global()
                        .configuration
                        .to_list()
                        .filter_by(&|s0| self.get_state_by_id(*s0).parent == s.id)
                        .to_set()
                };
                ahistory.put_move(h.id, memory);
            }
        }
        datamodel.global().history_value.put_all(&ahistory);

        for sid in statesToExitSorted.iterator() {
            // Invocations die before the state's own exit actions run.
            crate::invoke::cancel_invocations_for_state(datamodel, *sid);
            datamodel.global().delays.cancel_owned_by(*sid);
            let onExitId = self.get_state_by_id(*sid).onexit;
            if onExitId != 0 {
                self.set_scope(datamodel, *sid);
                self.executeContent(datamodel, onExitId);
            }
            let global = datamodel.global();
            global.configuration.delete(sid);
            global.step.exited.push(*sid);
        }
    }

    /// *W3C says*:
    /// ## procedure enterStates(enabledTransitions)
    /// First, compute the list of all the states that will be entered as a
    /// result of taking the transitions in enabledTransitions. Add them to
    /// statesToInvoke so that invoke processing can be done at the start of
    /// the next macrostep. For each entered state run the onentry handlers
    /// and generate the relevant done events for entered final states.
    fn enterStates(&mut self, datamodel: &mut dyn Datamodel, enabledTransitions: &List<TransitionId>) {
        let binding = self.binding;
        let mut statesToEnter = OrderedSet::new();
        let mut statesForDefaultEntry = OrderedSet::new();
        // Temporary table for default content in history states.
        let mut defaultHistoryContent: HashTable<StateId, ExecutableContentId> = HashTable::new();
        self.computeEntrySet(
            datamodel,
            enabledTransitions,
            &mut statesToEnter,
            &mut statesForDefaultEntry,
            &mut defaultHistoryContent,
        );
        let sorted = statesToEnter
            .to_list()
            .sort(&|s1, s2| self.state_entry_order(s1, s2));
        for s in sorted.iterator() {
            {
                let global = datamodel.global();
                global.configuration.add(*s);
                global.states_to_invoke.add(*s);
                global.step.entered.push(*s);
            }
            if binding == BindingType::Late {
                // Late binding re-initializes the frame on every entry.
                datamodel.initializeDataModel(self, *s);
                self.get_state_by_id_mut(*s).is_first_entry = false;
            }
            let mut exe = Vec::new();
            {
                let state_s: &State = self.get_state_by_id(*s);
                exe.push(state_s.onentry);
                if statesForDefaultEntry.is_member(s) && state_s.initial != 0 {
                    exe.push(self.get_transition_by_id(state_s.initial).content);
                }
                if defaultHistoryContent.has(s) {
                    exe.push(*defaultHistoryContent.get(s));
                }
            }
            for ct in exe {
                if ct != 0 {
                    self.set_scope(datamodel, *s);
                    self.executeContent(datamodel, ct);
                }
            }

            if self.isFinalState(*s) {
                let parent: StateId = self.get_state_by_id(*s).parent;
                let done_payload = self.evaluate_done_data(datamodel, *s);
                if self.isSCXMLElement(parent) {
                    let global = datamodel.global();
                    global.done_data = done_payload;
                    global.running = false;
                } else {
                    let parent_name = self.state_name(parent).to_string();
                    datamodel
                        .global()
                        .enqueue_internal(Event::done_state(&parent_name, done_payload));
                    let grandparent: StateId = self.get_state_by_id(parent).parent;
                    if self.isParallelState(grandparent)
                        && self
                            .getChildStates(grandparent)
                            .every(&|cs: &StateId| self.isInFinalState(datamodel.global_s(), *cs))
                    {
                        let grandparent_name = self.state_name(grandparent).to_string();
                        datamodel
                            .global()
                            .enqueue_internal(Event::done_state(&grandparent_name, None));
                    }
                }
            }
        }
    }

    /// Evaluates the `<donedata>` of a final state in its own scope.
    fn evaluate_done_data(&self, datamodel: &mut dyn Datamodel, sid: StateId) -> Option<Data> {
        let donedata = self.get_state_by_id(sid).donedata.clone()?;
        self.set_scope(datamodel, sid);
        if let Some(content) = datamodel.evaluate_content(&donedata.content) {
            return Some(content);
        }
        let mut values = Vec::new();
        datamodel.evaluate_params(&donedata.params, &mut values);
        if values.is_empty() {
            None
        } else {
            let mut m = crate::datamodel::DataMap::new();
            for (name, value) in values {
                m.insert(name, value);
            }
            Some(Data::Map(m))
        }
    }

    pub fn executeContent(&self, datamodel: &mut dyn Datamodel, contentId: ExecutableContentId) {
        if contentId != 0 {
            executable_content::execute_block(self, datamodel, contentId);
        }
    }

    pub fn isParallelState(&self, state: StateId) -> bool {
        state != 0 && self.get_state_by_id(state).is_parallel
    }

    pub fn isSCXMLElement(&self, state: StateId) -> bool {
        state == self.pseudo_root
    }

    pub fn isFinalState(&self, state: StateId) -> bool {
        self.get_state_by_id(state).is_final
    }

    pub fn isAtomicState(&self, state: StateId) -> bool {
        let s = self.get_state_by_id(state);
        s.states.is_empty() && s.history_type == HistoryType::None
    }

    /// *W3C says*:
    /// # procedure computeExitSet(enabledTransitions)
    /// For each transition t in enabledTransitions, if t is targetless then
    /// do nothing, else compute the transition's domain and add to the
    /// statesToExit set all states in the configuration that are
    /// descendants of the domain.
    fn computeExitSet(
        &self,
        datamodel: &mut dyn Datamodel,
        transitions: &List<TransitionId>,
    ) -> OrderedSet<StateId> {
        let mut statesToExit: OrderedSet<StateId> = OrderedSet::new();
        for tid in transitions.iterator() {
            let t = self.get_transition_by_id(*tid);
            if !t.target.is_empty() {
                let domain = self.getTransitionDomain(datamodel, t);
                let configuration = datamodel.global().configuration.to_list();
                for s in configuration.iterator() {
                    if self.isDescendant(*s, domain) {
                        statesToExit.add(*s);
                    }
                }
            }
        }
        statesToExit
    }

    /// *W3C says*:
    /// # procedure executeTransitionContent(enabledTransitions)
    /// For each transition in the list of enabledTransitions, execute its
    /// executable content.
    fn executeTransitionContent(
        &self,
        datamodel: &mut dyn Datamodel,
        enabledTransitions: &List<TransitionId>,
    ) {
        for tid in enabledTransitions.iterator() {
            let (content, source) = {
                let t = self.get_transition_by_id(*tid);
                (t.content, t.source)
            };
            if content != 0 {
                self.set_scope(datamodel, source);
                self.executeContent(datamodel, content);
            }
        }
    }

    /// *W3C says*:
    /// # procedure computeEntrySet(transitions, statesToEnter, statesForDefaultEntry, defaultHistoryContent)
    /// Compute the complete set of states that will be entered as a result
    /// of taking 'transitions'.
    fn computeEntrySet(
        &self,
        datamodel: &mut dyn Datamodel,
        transitions: &List<TransitionId>,
        statesToEnter: &mut OrderedSet<StateId>,
        statesForDefaultEntry: &mut OrderedSet<StateId>,
        defaultHistoryContent: &mut HashTable<StateId, ExecutableContentId>,
    ) {
        for tid in transitions.iterator() {
            let t = self.get_transition_by_id(*tid);
            for s in t.target.iter() {
                self.addDescendantStatesToEnter(
                    datamodel,
                    *s,
                    statesToEnter,
                    statesForDefaultEntry,
                    defaultHistoryContent,
                );
            }
            let ancestor = self.getTransitionDomain(datamodel, t);
            for s in self.getEffectiveTargetStates(datamodel, t).iterator() {
                self.addAncestorStatesToEnter(
                    datamodel,
                    *s,
                    ancestor,
                    statesToEnter,
                    statesForDefaultEntry,
                    defaultHistoryContent,
                );
            }
        }
    }

    /// *W3C says*:
    /// # procedure addDescendantStatesToEnter(state,statesToEnter,statesForDefaultEntry, defaultHistoryContent)
    /// The purpose of this procedure is to add to statesToEnter 'state' and
    /// any of its descendants that the state machine will end up entering
    /// when it enters 'state'. (N.B. If 'state' is a history pseudo-state,
    /// we dereference it and add the history value instead.)
    fn addDescendantStatesToEnter(
        &self,
        datamodel: &mut dyn Datamodel,
        sid: StateId,
        statesToEnter: &mut OrderedSet<StateId>,
        statesForDefaultEntry: &mut OrderedSet<StateId>,
        defaultHistoryContent: &mut HashTable<StateId, ExecutableContentId>,
    ) {
        let state = self.get_state_by_id(sid);
        if self.isHistoryState(sid) {
            if datamodel.global().history_value.has(&sid) {
                let stateIds: Vec<StateId> = datamodel
                    .global()
                    .history_value
                    .get(&sid)
                    .to_list()
                    .data
                    .clone();
                for s in &stateIds {
                    self.addDescendantStatesToEnter(
                        datamodel,
                        *s,
                        statesToEnter,
                        statesForDefaultEntry,
                        defaultHistoryContent,
                    );
                }
                for s in &stateIds {
                    self.addAncestorStatesToEnter(
                        datamodel,
                        *s,
                        state.parent,
                        statesToEnter,
                        statesForDefaultEntry,
                        defaultHistoryContent,
                    );
                }
            } else {
                // A history state has exactly one transition which specifies
                // the default history configuration.
                if state.transitions.is_empty() {
                    return;
                }
                let defaultTransition = self.get_transition_by_id(state.transitions[0]);
                defaultHistoryContent.put_move(state.parent, defaultTransition.content);
                for s in &defaultTransition.target {
                    self.addDescendantStatesToEnter(
                        datamodel,
                        *s,
                        statesToEnter,
                        statesForDefaultEntry,
                        defaultHistoryContent,
                    );
                }
                for s in &defaultTransition.target {
                    self.addAncestorStatesToEnter(
                        datamodel,
                        *s,
                        state.parent,
                        statesToEnter,
                        statesForDefaultEntry,
                        defaultHistoryContent,
                    );
                }
            }
        } else {
            statesToEnter.add(sid);
            if self.isCompoundState(sid) {
                statesForDefaultEntry.add(sid);
                if state.initial != 0 {
                    let initialTransition = self.get_transition_by_id(state.initial);
                    for s in &initialTransition.target {
                        self.addDescendantStatesToEnter(
                            datamodel,
                            *s,
                            statesToEnter,
                            statesForDefaultEntry,
                            defaultHistoryContent,
                        );
                    }
                    for s in &initialTransition.target {
                        self.addAncestorStatesToEnter(
                            datamodel,
                            *s,
                            sid,
                            statesToEnter,
                            statesForDefaultEntry,
                            defaultHistoryContent,
                        );
                    }
                }
            } else if self.isParallelState(sid) {
                for child in self.getChildStates(sid).iterator() {
                    if !statesToEnter.some(&|s| self.isDescendant(*s, *child)) {
                        self.addDescendantStatesToEnter(
                            datamodel,
                            *child,
                            statesToEnter,
                            statesForDefaultEntry,
                            defaultHistoryContent,
                        );
                    }
                }
            }
        }
    }

    /// *W3C says*:
    /// # procedure addAncestorStatesToEnter(state, ancestor, statesToEnter, statesForDefaultEntry, defaultHistoryContent)
    /// Add to statesToEnter any ancestors of 'state' up to, but not
    /// including, 'ancestor' that must be entered in order to enter
    /// 'state'. If any of these ancestor states is a parallel state, we
    /// must fill in its descendants as well.
    fn addAncestorStatesToEnter(
        &self,
        datamodel: &mut dyn Datamodel,
        state: StateId,
        ancestor: StateId,
        statesToEnter: &mut OrderedSet<StateId>,
        statesForDefaultEntry: &mut OrderedSet<StateId>,
        defaultHistoryContent: &mut HashTable<StateId, ExecutableContentId>,
    ) {
        for anc in self.getProperAncestors(state, ancestor).iterator() {
            statesToEnter.add(*anc);
            if self.isParallelState(*anc) {
                for child in self.getChildStates(*anc).iterator() {
                    if !statesToEnter.some(&|s| self.isDescendant(*s, *child)) {
                        self.addDescendantStatesToEnter(
                            datamodel,
                            *child,
                            statesToEnter,
                            statesForDefaultEntry,
                            defaultHistoryContent,
                        );
                    }
                }
            }
        }
    }

    /// *W3C says*:
    /// # procedure isInFinalState(s)
    /// Return true if s is a compound state and one of its children is an
    /// active final state (i.e. is a member of the current configuration),
    /// or if s is a parallel state and isInFinalState is true of all its
    /// children.
    fn isInFinalState(&self, global: &crate::datamodel::GlobalData, s: StateId) -> bool {
        if self.isCompoundState(s) {
            self.getChildStates(s).some(&|cs: &StateId| {
                self.isFinalState(*cs) && global.configuration.is_member(cs)
            })
        } else if self.isParallelState(s) {
            self.getChildStates(s)
                .every(&|cs: &StateId| self.isInFinalState(global, *cs))
        } else {
            false
        }
    }

    /// *W3C says*:
    /// # function getTransitionDomain(transition)
    /// Return the compound state such that 1) all states that are exited or
    /// entered as a result of taking 'transition' are descendants of it and
    /// 2) no descendant of it has this property.
    fn getTransitionDomain(&self, datamodel: &mut dyn Datamodel, t: &Transition) -> StateId {
        let tstates = self.getEffectiveTargetStates(datamodel, t);
        if tstates.is_empty() {
            0
        } else if t.transition_type == TransitionType::Internal
            && self.isCompoundState(t.source)
            && tstates.every(&|s| self.isDescendant(*s, t.source))
        {
            t.source
        } else {
            let mut l = List::new();
            l.push(t.source);
            self.findLCCA(&l.append_set(&tstates))
        }
    }

    /// *W3C says*:
    /// # function findLCCA(stateList)
    /// The Least Common Compound Ancestor is the `<state>` or `<scxml>`
    /// element s such that s is a proper ancestor of all states on
    /// stateList and no descendant of s has this property.
    fn findLCCA(&self, stateList: &List<StateId>) -> StateId {
        let mut lcca = 0;
        let ancestors = self
            .getProperAncestors(*stateList.head(), 0)
            .to_list()
            .filter_by(&|s| self.isCompoundStateOrScxmlElement(*s));
        for anc in ancestors.iterator() {
            if stateList.tail().every(&|s| self.isDescendant(*s, *anc)) {
                lcca = *anc;
                break;
            }
        }
        lcca
    }

    /// *W3C says*:
    /// # function getEffectiveTargetStates(transition)
    /// Returns the states that will be the target when 'transition' is
    /// taken, dereferencing any history states.
    fn getEffectiveTargetStates(
        &self,
        datamodel: &mut dyn Datamodel,
        transition: &Transition,
    ) -> OrderedSet<StateId> {
        let mut targets: OrderedSet<StateId> = OrderedSet::new();
        for sid in &transition.target {
            if self.isHistoryState(*sid) {
                if datamodel.global().history_value.has(sid) {
                    let memory = datamodel.global().history_value.get(sid).clone();
                    targets.union(&memory);
                } else {
                    // History states have exactly one transition.
                    let s = self.get_state_by_id(*sid);
                    if !s.transitions.is_empty() {
                        targets.union(&self.getEffectiveTargetStates(
                            datamodel,
                            self.get_transition_by_id(s.transitions[0]),
                        ));
                    }
                }
            } else {
                targets.add(*sid);
            }
        }
        targets
    }

    /// *W3C says*:
    /// # function getProperAncestors(state1, state2)
    /// If state2 is null, returns the set of all ancestors of state1 in
    /// ancestry order (state1's parent followed by the parent's parent,
    /// etc. up to and including the `<scxml>` element). If state2 is
    /// non-null, returns in ancestry order the set of all ancestors of
    /// state1, up to but not including state2.
    fn getProperAncestors(&self, state1: StateId, state2: StateId) -> OrderedSet<StateId> {
        let mut properAncestors: OrderedSet<StateId> = OrderedSet::new();
        if !self.isDescendant(state2, state1) {
            let mut currState = self.get_state_by_id(state1).parent;
            while currState != 0 && currState != state2 {
                properAncestors.add(currState);
                currState = self.get_state_by_id(currState).parent;
            }
        }
        properAncestors
    }

    /// *W3C says*:
    /// # function isDescendant(state1, state2)
    /// Returns 'true' if state1 is a descendant of state2 (a child, or a
    /// child of a child, etc.). Otherwise returns 'false'.
    fn isDescendant(&self, state1: StateId, state2: StateId) -> bool {
        if state1 == 0 || state2 == 0 || state1 == state2 {
            false
        } else {
            let mut currState = self.get_state_by_id(state1).parent;
            while currState != 0 && currState != state2 {
                currState = self.get_state_by_id(currState).parent;
            }
            currState == state2
        }
    }

    /// *W3C says*:
    /// A Compound State: A state of type `<state>` with at least one child
    /// state.
    fn isCompoundState(&self, state: StateId) -> bool {
        if state != 0 {
            let stateS = self.get_state_by_id(state);
            !(stateS.is_final || stateS.is_parallel || stateS.states.is_empty())
        } else {
            false
        }
    }

    fn isCompoundStateOrScxmlElement(&self, sid: StateId) -> bool {
        sid == self.pseudo_root || self.isCompoundState(sid)
    }

    pub fn isHistoryState(&self, state: StateId) -> bool {
        self.get_state_by_id(state).history_type != HistoryType::None
    }

    /// *W3C says*:
    /// # function getChildStates(state1)
    /// Returns a list containing all `<state>`, `<final>`, and `<parallel>`
    /// children of state1.
    fn getChildStates(&self, state1: StateId) -> List<StateId> {
        let mut l: List<StateId> = List::new();
        let stateRef = self.get_state_by_id(state1);
        for c in &stateRef.states {
            if !self.isHistoryState(*c) {
                l.push(*c);
            }
        }
        l
    }

    /// *W3C says*:
    /// 5.9.1 Conditional Expressions
    /// If a conditional expression cannot be evaluated as a boolean value
    /// or if its evaluation causes an error, the SCXML Processor must treat
    /// the expression as if it evaluated to 'false' and must place the
    /// error 'error.execution' in the internal event queue.
    fn conditionMatch(&self, datamodel: &mut dyn Datamodel, tid: TransitionId) -> bool {
        let (cond, source) = {
            let t = self.get_transition_by_id(tid);
            (t.cond.clone(), t.source)
        };
        match cond {
            Some(c) if !c.is_empty() => {
                self.set_scope(datamodel, source);
                match datamodel.execute_condition(&c) {
                    Ok(v) => v,
                    Err(e) => {
                        error!("Condition '{}' can't be evaluated: {}", c, e);
                        datamodel.internal_error_execution(&e);
                        false
                    }
                }
            }
            _ => true,
        }
    }
}
