//! In-process model of the deployed Stem program.
//!
//! Executes the five operations against account snapshots and returns the
//! account images the program would write. Account checks mirror what the
//! client builds: derived addresses must match, the caller must sign, and
//! relationship statuses must allow the transition.

use chrono::{DateTime, Utc};
use solana_program::instruction::{AccountMeta, Instruction};
use solana_program::pubkey::Pubkey;
use solana_program::rent::Rent;
use tracing::debug;

use stem_core::codec::{
    decode_channel, decode_content, decode_descriptor, encode_channel_account,
    encode_descriptor_account,
};
use stem_core::constants::{CHANNEL_ID_SIZE, OPCODE_SIZE};
use stem_core::error::{Result, StemError};
use stem_core::types::{
    AccountInfo, Channel, ChannelId, Descriptor, Identity, Message, OperationKind, Peer,
    RelationshipStatus,
};
use stem_crypto::{channel_identifier, opcode_for, ProgramAddresses};

/// An account image produced by an executed operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountWrite {
    /// Account being written
    pub address: Pubkey,
    /// New contents
    pub account: AccountInfo,
}

/// The Stem program, bound to a program id.
#[derive(Clone, Debug, Default)]
pub struct StemProgram {
    addresses: ProgramAddresses,
}

fn rejected(reason: impl Into<String>) -> StemError {
    StemError::SubmissionRejected(reason.into())
}

fn account_at<'a>(ix: &'a Instruction, index: usize, role: &str) -> Result<&'a AccountMeta> {
    ix.accounts
        .get(index)
        .ok_or_else(|| rejected(format!("missing {role} account at position {index}")))
}

fn signer_at<'a>(ix: &'a Instruction, index: usize, role: &str) -> Result<&'a AccountMeta> {
    let meta = account_at(ix, index, role)?;
    if !meta.is_signer {
        return Err(rejected(format!("{role} must sign")));
    }
    Ok(meta)
}

fn writable_at<'a>(ix: &'a Instruction, index: usize, role: &str) -> Result<&'a AccountMeta> {
    let meta = account_at(ix, index, role)?;
    if !meta.is_writable {
        return Err(rejected(format!("{role} must be writable")));
    }
    Ok(meta)
}

fn read_channel_id(bytes: &[u8]) -> Result<ChannelId> {
    let raw = bytes
        .get(..CHANNEL_ID_SIZE)
        .ok_or_else(|| rejected("payload is missing the channel identifier"))?;
    let mut id = [0u8; CHANNEL_ID_SIZE];
    id.copy_from_slice(raw);
    Ok(id)
}

fn set_status(descriptor: &mut Descriptor, peer: Identity, status: RelationshipStatus) {
    match descriptor.peers.iter_mut().find(|p| p.identity == peer) {
        Some(entry) => entry.status = status,
        None => descriptor.peers.push(Peer::new(peer, status)),
    }
}

impl StemProgram {
    /// Models the program deployed at `program_id`.
    pub fn new(program_id: Pubkey) -> Self {
        Self {
            addresses: ProgramAddresses::new(program_id),
        }
    }

    /// The program id this model answers to.
    pub fn program_id(&self) -> &Pubkey {
        self.addresses.program_id()
    }

    fn write(&self, address: Pubkey, data: Vec<u8>) -> AccountWrite {
        AccountWrite {
            address,
            account: AccountInfo::new(
                Rent::default().minimum_balance(data.len()),
                *self.program_id(),
                data,
            ),
        }
    }

    fn write_descriptor(&self, address: Pubkey, descriptor: &Descriptor) -> Result<AccountWrite> {
        Ok(self.write(address, encode_descriptor_account(descriptor)?))
    }

    fn expect_descriptor(&self, meta: &AccountMeta, owner: &Identity) -> Result<()> {
        if meta.pubkey != self.addresses.descriptor(owner)?.address {
            return Err(rejected(format!("descriptor account does not belong to {owner}")));
        }
        Ok(())
    }

    fn load_descriptor<F>(&self, read: &F, address: &Pubkey, owner: &Identity) -> Result<Descriptor>
    where
        F: Fn(&Pubkey) -> Option<AccountInfo>,
    {
        let account = read(address).ok_or_else(|| rejected(format!("{owner} is not registered")))?;
        decode_descriptor(&account.data)
    }

    fn decode_kind<'a>(&self, data: &'a [u8]) -> Result<(OperationKind, &'a [u8])> {
        if data.len() < OPCODE_SIZE {
            return Err(rejected("payload shorter than an opcode"));
        }
        let (opcode, rest) = data.split_at(OPCODE_SIZE);
        OperationKind::ALL
            .into_iter()
            .find(|kind| opcode_for(*kind).as_slice() == opcode)
            .map(|kind| (kind, rest))
            .ok_or_else(|| rejected(format!("unknown opcode {opcode:02x?}")))
    }

    /// Executes one instruction against the accounts visible through `read`.
    ///
    /// Returns the writes to apply; nothing is written on error.
    pub fn execute<F>(&self, ix: &Instruction, now: DateTime<Utc>, read: F) -> Result<Vec<AccountWrite>>
    where
        F: Fn(&Pubkey) -> Option<AccountInfo>,
    {
        if &ix.program_id != self.program_id() {
            return Err(rejected(format!("instruction targets program {}", ix.program_id)));
        }
        let (kind, args) = self.decode_kind(&ix.data)?;
        debug!(%kind, accounts = ix.accounts.len(), "executing");

        match kind {
            OperationKind::Register => self.register(ix, &read),
            OperationKind::Invite => self.invite(ix, &read),
            OperationKind::Accept => self.accept(ix, args, &read),
            OperationKind::Reject => self.reject(ix, &read),
            OperationKind::SendMessage => self.send_message(ix, args, now, &read),
        }
    }

    fn register<F>(&self, ix: &Instruction, read: &F) -> Result<Vec<AccountWrite>>
    where
        F: Fn(&Pubkey) -> Option<AccountInfo>,
    {
        let descriptor = writable_at(ix, 0, "descriptor")?;
        let owner = signer_at(ix, 1, "owner")?.pubkey;
        self.expect_descriptor(descriptor, &owner)?;

        if read(&descriptor.pubkey).is_some() {
            return Err(rejected(format!("{owner} is already registered")));
        }
        Ok(vec![self.write_descriptor(descriptor.pubkey, &Descriptor::default())?])
    }

    /// Resolves `owner, peer, owner descriptor, peer descriptor` shared by
    /// invite, accept and reject.
    fn pair<F>(&self, ix: &Instruction, read: &F) -> Result<Pair>
    where
        F: Fn(&Pubkey) -> Option<AccountInfo>,
    {
        let owner = signer_at(ix, 0, "owner")?.pubkey;
        let peer = account_at(ix, 1, "peer")?.pubkey;
        if owner == peer {
            return Err(rejected("owner and peer are the same identity"));
        }
        let owner_meta = writable_at(ix, 2, "owner descriptor")?;
        let peer_meta = writable_at(ix, 3, "peer descriptor")?;
        self.expect_descriptor(owner_meta, &owner)?;
        self.expect_descriptor(peer_meta, &peer)?;

        Ok(Pair {
            owner,
            peer,
            owner_address: owner_meta.pubkey,
            peer_address: peer_meta.pubkey,
            owner_descriptor: self.load_descriptor(read, &owner_meta.pubkey, &owner)?,
            peer_descriptor: self.load_descriptor(read, &peer_meta.pubkey, &peer)?,
        })
    }

    fn invite<F>(&self, ix: &Instruction, read: &F) -> Result<Vec<AccountWrite>>
    where
        F: Fn(&Pubkey) -> Option<AccountInfo>,
    {
        let mut pair = self.pair(ix, read)?;
        if let Some(existing) = pair.owner_descriptor.get(&pair.peer) {
            return Err(rejected(format!(
                "{} already has status {} with {}",
                pair.owner, existing.status, pair.peer
            )));
        }
        set_status(&mut pair.owner_descriptor, pair.peer, RelationshipStatus::Invited);
        set_status(&mut pair.peer_descriptor, pair.owner, RelationshipStatus::Requested);
        pair.into_writes(self)
    }

    fn expect_requested(pair: &Pair) -> Result<()> {
        match pair.owner_descriptor.get(&pair.peer).map(|p| p.status) {
            Some(RelationshipStatus::Requested) => Ok(()),
            other => Err(rejected(format!(
                "{} has no pending invitation from {} (status {:?})",
                pair.owner, pair.peer, other
            ))),
        }
    }

    fn accept<F>(&self, ix: &Instruction, args: &[u8], read: &F) -> Result<Vec<AccountWrite>>
    where
        F: Fn(&Pubkey) -> Option<AccountInfo>,
    {
        let mut pair = self.pair(ix, read)?;
        Self::expect_requested(&pair)?;

        let id = read_channel_id(args)?;
        if id != channel_identifier(&pair.owner, &pair.peer)? {
            return Err(rejected("channel identifier does not match the pair"));
        }
        let channel_meta = writable_at(ix, 4, "channel")?;
        if channel_meta.pubkey != self.addresses.channel_for_id(&id)?.address {
            return Err(rejected("channel account does not match the identifier"));
        }
        if read(&channel_meta.pubkey).is_some() {
            return Err(rejected("channel account already exists"));
        }

        set_status(&mut pair.owner_descriptor, pair.peer, RelationshipStatus::Accepted);
        set_status(&mut pair.peer_descriptor, pair.owner, RelationshipStatus::Accepted);
        let channel = Channel::new(pair.peer, pair.owner);
        let channel_write = self.write(channel_meta.pubkey, encode_channel_account(&channel)?);

        let mut writes = pair.into_writes(self)?;
        writes.push(channel_write);
        Ok(writes)
    }

    fn reject<F>(&self, ix: &Instruction, read: &F) -> Result<Vec<AccountWrite>>
    where
        F: Fn(&Pubkey) -> Option<AccountInfo>,
    {
        let mut pair = self.pair(ix, read)?;
        Self::expect_requested(&pair)?;
        set_status(&mut pair.owner_descriptor, pair.peer, RelationshipStatus::Rejected);
        set_status(&mut pair.peer_descriptor, pair.owner, RelationshipStatus::Rejected);
        pair.into_writes(self)
    }

    fn send_message<F>(
        &self,
        ix: &Instruction,
        args: &[u8],
        now: DateTime<Utc>,
        read: &F,
    ) -> Result<Vec<AccountWrite>>
    where
        F: Fn(&Pubkey) -> Option<AccountInfo>,
    {
        let sender = signer_at(ix, 0, "sender")?.pubkey;
        let channel_meta = writable_at(ix, 1, "channel")?;

        let id = read_channel_id(args)?;
        if channel_meta.pubkey != self.addresses.channel_for_id(&id)?.address {
            return Err(rejected("channel account does not match the identifier"));
        }
        let (content, used) = decode_content(&args[CHANNEL_ID_SIZE..])?;
        if CHANNEL_ID_SIZE + used != args.len() {
            return Err(rejected("trailing bytes after message content"));
        }

        let account = read(&channel_meta.pubkey).ok_or_else(|| rejected("channel does not exist"))?;
        let mut channel = decode_channel(&account.data)?;
        if !channel.has_participant(&sender) {
            return Err(rejected(format!("{sender} is not a participant")));
        }

        channel.messages.push(Message::new(sender, content, now));
        channel.message_count = channel.message_count.saturating_add(1);
        Ok(vec![self.write(channel_meta.pubkey, encode_channel_account(&channel)?)])
    }
}

struct Pair {
    owner: Identity,
    peer: Identity,
    owner_address: Pubkey,
    peer_address: Pubkey,
    owner_descriptor: Descriptor,
    peer_descriptor: Descriptor,
}

impl Pair {
    fn into_writes(self, program: &StemProgram) -> Result<Vec<AccountWrite>> {
        Ok(vec![
            program.write_descriptor(self.owner_address, &self.owner_descriptor)?,
            program.write_descriptor(self.peer_address, &self.peer_descriptor)?,
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use solana_program::system_program;
    use stem_core::codec::encode_content;
    use stem_core::constants::PROGRAM_ID;

    struct World {
        program: StemProgram,
        accounts: HashMap<Pubkey, AccountInfo>,
    }

    impl World {
        fn new() -> Self {
            Self {
                program: StemProgram::new(PROGRAM_ID),
                accounts: HashMap::new(),
            }
        }

        fn run(&mut self, ix: Instruction) -> Result<()> {
            let writes = self.program.execute(&ix, Utc::now(), |a| self.accounts.get(a).cloned())?;
            for w in writes {
                self.accounts.insert(w.address, w.account);
            }
            Ok(())
        }

        fn descriptor(&self, owner: &Identity) -> Descriptor {
            let address = ProgramAddresses::default().descriptor(owner).unwrap().address;
            decode_descriptor(&self.accounts[&address].data).unwrap()
        }
    }

    fn addr() -> ProgramAddresses {
        ProgramAddresses::default()
    }

    fn register_ix(owner: Identity) -> Instruction {
        Instruction::new_with_bytes(
            PROGRAM_ID,
            &opcode_for(OperationKind::Register),
            vec![
                AccountMeta::new(addr().descriptor(&owner).unwrap().address, false),
                AccountMeta::new_readonly(owner, true),
                AccountMeta::new_readonly(system_program::ID, false),
            ],
        )
    }

    fn pair_ix(kind: OperationKind, owner: Identity, peer: Identity, data: Vec<u8>) -> Instruction {
        let mut accounts = vec![
            AccountMeta::new_readonly(owner, true),
            AccountMeta::new_readonly(peer, false),
            AccountMeta::new(addr().descriptor(&owner).unwrap().address, false),
            AccountMeta::new(addr().descriptor(&peer).unwrap().address, false),
        ];
        if kind == OperationKind::Accept {
            accounts.push(AccountMeta::new(addr().channel(&owner, &peer).unwrap().address, false));
        }
        let mut payload = opcode_for(kind).to_vec();
        payload.extend_from_slice(&data);
        Instruction::new_with_bytes(PROGRAM_ID, &payload, accounts)
    }

    fn send_ix(owner: Identity, peer: Identity, content: &str) -> Instruction {
        let id = channel_identifier(&owner, &peer).unwrap();
        let mut payload = opcode_for(OperationKind::SendMessage).to_vec();
        payload.extend_from_slice(&id);
        payload.extend_from_slice(&encode_content(content).unwrap());
        Instruction::new_with_bytes(
            PROGRAM_ID,
            &payload,
            vec![
                AccountMeta::new_readonly(owner, true),
                AccountMeta::new(addr().channel(&owner, &peer).unwrap().address, false),
            ],
        )
    }

    #[test]
    fn test_full_flow() {
        let alice = Pubkey::new_unique();
        let bob = Pubkey::new_unique();
        let mut world = World::new();

        world.run(register_ix(alice)).unwrap();
        world.run(register_ix(bob)).unwrap();
        world.run(pair_ix(OperationKind::Invite, alice, bob, vec![])).unwrap();

        assert_eq!(world.descriptor(&alice).get(&bob).unwrap().status, RelationshipStatus::Invited);
        assert_eq!(world.descriptor(&bob).get(&alice).unwrap().status, RelationshipStatus::Requested);

        let id = channel_identifier(&bob, &alice).unwrap();
        world.run(pair_ix(OperationKind::Accept, bob, alice, id.to_vec())).unwrap();
        assert_eq!(world.descriptor(&alice).get(&bob).unwrap().status, RelationshipStatus::Accepted);

        world.run(send_ix(alice, bob, "hello bob")).unwrap();
        world.run(send_ix(bob, alice, "hi alice")).unwrap();

        let channel_address = addr().channel(&alice, &bob).unwrap().address;
        let channel = decode_channel(&world.accounts[&channel_address].data).unwrap();
        assert_eq!(channel.message_count, 2);
        assert_eq!(channel.messages[0].content, "hello bob");
        assert_eq!(channel.messages[1].sender, bob);
    }

    #[test]
    fn test_double_register_rejected() {
        let alice = Pubkey::new_unique();
        let mut world = World::new();
        world.run(register_ix(alice)).unwrap();
        assert!(matches!(world.run(register_ix(alice)), Err(StemError::SubmissionRejected(_))));
    }

    #[test]
    fn test_invite_requires_registered_peer() {
        let alice = Pubkey::new_unique();
        let bob = Pubkey::new_unique();
        let mut world = World::new();
        world.run(register_ix(alice)).unwrap();
        assert!(world.run(pair_ix(OperationKind::Invite, alice, bob, vec![])).is_err());
    }

    #[test]
    fn test_inviter_cannot_accept() {
        let alice = Pubkey::new_unique();
        let bob = Pubkey::new_unique();
        let mut world = World::new();
        world.run(register_ix(alice)).unwrap();
        world.run(register_ix(bob)).unwrap();
        world.run(pair_ix(OperationKind::Invite, alice, bob, vec![])).unwrap();

        let id = channel_identifier(&alice, &bob).unwrap();
        assert!(world.run(pair_ix(OperationKind::Accept, alice, bob, id.to_vec())).is_err());
    }

    #[test]
    fn test_reject_marks_both_sides() {
        let alice = Pubkey::new_unique();
        let bob = Pubkey::new_unique();
        let mut world = World::new();
        world.run(register_ix(alice)).unwrap();
        world.run(register_ix(bob)).unwrap();
        world.run(pair_ix(OperationKind::Invite, alice, bob, vec![])).unwrap();
        world.run(pair_ix(OperationKind::Reject, bob, alice, vec![])).unwrap();

        assert_eq!(world.descriptor(&alice).get(&bob).unwrap().status, RelationshipStatus::Rejected);
        assert_eq!(world.descriptor(&bob).get(&alice).unwrap().status, RelationshipStatus::Rejected);
        assert!(world.run(pair_ix(OperationKind::Invite, alice, bob, vec![])).is_err());
    }

    #[test]
    fn test_outsider_cannot_send() {
        let alice = Pubkey::new_unique();
        let bob = Pubkey::new_unique();
        let mallory = Pubkey::new_unique();
        let mut world = World::new();
        world.run(register_ix(alice)).unwrap();
        world.run(register_ix(bob)).unwrap();
        world.run(pair_ix(OperationKind::Invite, alice, bob, vec![])).unwrap();
        let id = channel_identifier(&alice, &bob).unwrap();
        world.run(pair_ix(OperationKind::Accept, bob, alice, id.to_vec())).unwrap();

        let mut ix = send_ix(alice, bob, "spoof");
        ix.accounts[0] = AccountMeta::new_readonly(mallory, true);
        assert!(world.run(ix).is_err());
    }

    #[test]
    fn test_unknown_opcode_and_wrong_program() {
        let alice = Pubkey::new_unique();
        let mut world = World::new();

        let mut ix = register_ix(alice);
        ix.data = vec![0u8; 8];
        assert!(world.run(ix).is_err());

        let mut ix = register_ix(alice);
        ix.program_id = Pubkey::new_unique();
        assert!(world.run(ix).is_err());
    }

    #[test]
    fn test_unsigned_register_rejected() {
        let alice = Pubkey::new_unique();
        let mut world = World::new();
        let mut ix = register_ix(alice);
        ix.accounts[1].is_signer = false;
        assert!(world.run(ix).is_err());
    }
}
