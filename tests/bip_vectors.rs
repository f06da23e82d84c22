//! Published BIP-174 PSBTs and Bitcoin Core BIP-341 key-path sighash cases.
//!
//! Every byte string here comes from outside this crate, so an error made
//! the same way in both the encoder and the decoder still shows up.

use pretty_assertions::assert_eq;

use wallet_broker::Network;
use wallet_broker::error::PsbtError;
use wallet_broker::psbt::{Psbt, Transaction, TxOut, preview, taproot_key_spend_sighash};

/// BIP-174 valid vector: one P2PKH input carried as a non-witness UTXO.
const P2PKH_INPUT_PSBT: &str = "70736274ff0100750200000001268171371edff285e937adeea4b37b78000c0566cbb3ad64641713ca42171bf60000000000feffffff02d3dff505000000001976a914d0c59903c5bac2868760e90fd521a4665aa7652088ac00e1f5050000000017a9143545e6e33b832c47050f24d3eeb93c9c03948bc787b32e1300000100fda5010100000000010289a3c71eab4d20e0371bbba4cc698fa295c9463afa2e397f8533ccb62f9567e50100000017160014be18d152a9b012039daf3da7de4f53349eecb985ffffffff86f8aa43a71dff1448893a530a7237ef6b4608bbb2dd2d0171e63aec6a4890b40100000017160014fe3e9ef1a745e974d902c4355943abcb34bd5353ffffffff0200c2eb0b000000001976a91485cff1097fd9e008bb34af709c62197b38978a4888ac72fef84e2c00000017a914339725ba21efd62ac753a9bcd067d6c7a6a39d05870247304402202712be22e0270f394f568311dc7ca9a68970b8025fdd3b240229f07f8a5f3a240220018b38d7dcd314e734c9276bd6fb40f673325bc4baa144c800d2f2f02db2765c012103d2e15674941bad4a996372cb87e1856d3652606d98562fe39c5e9e7e413f210502483045022100d12b852d85dcd961d2f5f4ab660654df6eedcc794c0c33ce5cc309ffb5fce58d022067338a8e0e1725c197fb1a88af59f51e44e4255b20167c8684031c05d1f2592a01210223b72beef0965d10be0778efecd61fcac6f79a4ea169393380734464f84f2ab300000000000000";

/// BIP-174 valid vector: a finalized P2PKH input and a P2SH-P2WPKH input
/// with a witness UTXO and redeem script.
const MIXED_INPUT_PSBT: &str = "70736274ff0100a00200000002ab0949a08c5af7c49b8212f417e2f15ab3f5c33dcf153821a8139f877a5b7be40000000000feffffffab0949a08c5af7c49b8212f417e2f15ab3f5c33dcf153821a8139f877a5b7be40100000000feffffff02603bea0b000000001976a914768a40bbd740cbe81d988e71de2a4d5c71396b1d88ac8e240000000000001976a9146f4620b553fa095e721b9ee0efe9fa039cca459788ac000000000001076a47304402204759661797c01b036b25928948686218347d89864b719e1f7fcf57d1e511658702205309eabf56aa4d8891ffd111fdf1336f3a29da866d7f8486d75546ceedaf93190121035cdc61fc7ba971c0b501a646a2a83b102cb43881217ca682dc86e2d73fa882920001012000e1f5050000000017a9143545e6e33b832c47050f24d3eeb93c9c03948bc787010416001485d13537f2e265405a34dbafa9e3dda01fb82308000000";

/// BIP-174 invalid vector: the unsigned transaction carries a scriptSig.
const SIGNED_GLOBAL_TX_PSBT: &str = "70736274ff0100fd0a010200000002ab0949a08c5af7c49b8212f417e2f15ab3f5c33dcf153821a8139f877a5b7be4000000006a47304402204759661797c01b036b25928948686218347d89864b719e1f7fcf57d1e511658702205309eabf56aa4d8891ffd111fdf1336f3a29da866d7f8486d75546ceedaf93190121035cdc61fc7ba971c0b501a646a2a83b102cb43881217ca682dc86e2d73fa88292feffffffab0949a08c5af7c49b8212f417e2f15ab3f5c33dcf153821a8139f877a5b7be40100000000feffffff02603bea0b000000001976a914768a40bbd740cbe81d988e71de2a4d5c71396b1d88ac8e240000000000001976a9146f4620b553fa095e721b9ee0efe9fa039cca459788ac00000000000001012000e1f5050000000017a9143545e6e33b832c47050f24d3eeb93c9c03948bc787010416001485d13537f2e265405a34dbafa9e3dda01fb82308000000";

/// BIP-174 invalid vector: two non-witness UTXO entries in one input map.
const DUPLICATE_INPUT_KEY_PSBT: &str = "70736274ff0100750200000001268171371edff285e937adeea4b37b78000c0566cbb3ad64641713ca42171bf60000000000feffffff02d3dff505000000001976a914d0c59903c5bac2868760e90fd521a4665aa7652088ac00e1f5050000000017a9143545e6e33b832c47050f24d3eeb93c9c03948bc787b32e1300000100fda5010100000000010289a3c71eab4d20e0371bbba4cc698fa295c9463afa2e397f8533ccb62f9567e50100000017160014be18d152a9b012039daf3da7de4f53349eecb985ffffffff86f8aa43a71dff1448893a530a7237ef6b4608bbb2dd2d0171e63aec6a4890b40100000017160014fe3e9ef1a745e974d902c4355943abcb34bd5353ffffffff0200c2eb0b000000001976a91485cff1097fd9e008bb34af709c62197b38978a4888ac72fef84e2c00000017a914339725ba21efd62ac753a9bcd067d6c7a6a39d05870247304402202712be22e0270f394f568311dc7ca9a68970b8025fdd3b240229f07f8a5f3a240220018b38d7dcd314e734c9276bd6fb40f673325bc4baa144c800d2f2f02db2765c012103d2e15674941bad4a996372cb87e1856d3652606d98562fe39c5e9e7e413f210502483045022100d12b852d85dcd961d2f5f4ab660654df6eedcc794c0c33ce5cc309ffb5fce58d022067338a8e0e1725c197fb1a88af59f51e44e4255b20167c8684031c05d1f2592a01210223b72beef0965d10be0778efecd61fcac6f79a4ea169393380734464f84f2ab30000000001003f0200000001ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff0000000000ffffffff010000000000000000036a010000000000000000";

fn decode(hex_psbt: &str) -> Result<Psbt, PsbtError> {
    Psbt::decode(&hex::decode(hex_psbt).unwrap())
}

fn txout(value: u64, script_hex: &str) -> TxOut {
    TxOut {
        value,
        script_pubkey: hex::decode(script_hex).unwrap(),
    }
}

// ============================================================================
// BIP-174
// ============================================================================

#[test]
fn non_witness_utxo_vector_decodes() {
    let psbt = decode(P2PKH_INPUT_PSBT).unwrap();

    assert_eq!(psbt.unsigned_tx.version, 2);
    assert_eq!(psbt.unsigned_tx.lock_time, 1_257_139);
    assert_eq!(psbt.inputs.len(), 1);
    assert_eq!(psbt.outputs.len(), 2);
    assert_eq!(
        psbt.unsigned_tx.outputs,
        vec![
            txout(99_999_699, "76a914d0c59903c5bac2868760e90fd521a4665aa7652088ac"),
            txout(100_000_000, "a9143545e6e33b832c47050f24d3eeb93c9c03948bc787"),
        ]
    );

    // The outpoint names the non-witness UTXO by its txid.
    let prev_tx = psbt.inputs[0].non_witness_utxo.as_ref().unwrap();
    assert_eq!(
        prev_tx.txid(),
        psbt.unsigned_tx.inputs[0].previous_output.txid
    );
    assert_eq!(
        psbt.spent_output(0).unwrap(),
        txout(200_000_000, "76a91485cff1097fd9e008bb34af709c62197b38978a4888ac")
    );

    assert_eq!(psbt.to_hex(), P2PKH_INPUT_PSBT);
}

#[test]
fn non_witness_utxo_vector_previews() {
    let preview = preview(P2PKH_INPUT_PSBT, Network::Mainnet).unwrap();

    assert_eq!(preview.inputs.len(), 1);
    assert_eq!(
        preview.inputs[0].address.as_deref(),
        Some("1DCXyYenPMJ5YFfHzTbc5fKwbhqgG8pjX2")
    );
    assert_eq!(preview.inputs[0].amount, 200_000_000);
    assert_eq!(
        preview.outputs[0].address.as_deref(),
        Some("1L2tGENeoh4mSoiUZrSbs1J3jazSdJH9QS")
    );
    assert_eq!(
        preview.outputs[1].address.as_deref(),
        Some("36YhUacEtcnkfhSbxwm11wDCexLGBLgJF6")
    );
    assert_eq!(preview.fee, 301);
}

#[test]
fn mixed_input_vector_decodes() {
    let psbt = decode(MIXED_INPUT_PSBT).unwrap();

    assert_eq!(psbt.inputs.len(), 2);
    assert_eq!(psbt.outputs.len(), 2);
    assert_eq!(psbt.unsigned_tx.outputs[0].value, 199_900_000);
    assert_eq!(psbt.unsigned_tx.outputs[1].value, 9_358);

    assert!(psbt.inputs[0].final_script_sig.is_some());
    assert_eq!(
        psbt.inputs[1].witness_utxo,
        Some(txout(100_000_000, "a9143545e6e33b832c47050f24d3eeb93c9c03948bc787"))
    );
    // Redeem script is not interpreted but must survive.
    assert_eq!(
        psbt.inputs[1].unknown,
        vec![(
            vec![0x04],
            hex::decode("001485d13537f2e265405a34dbafa9e3dda01fb82308").unwrap()
        )]
    );
    assert_eq!(psbt.unfinalized_inputs(), vec![1]);
    assert!(psbt.outputs.iter().all(|output| output.unknown.is_empty()));

    assert_eq!(psbt.to_hex(), MIXED_INPUT_PSBT);
}

#[test]
fn invalid_vectors_are_refused() {
    assert!(matches!(
        decode(SIGNED_GLOBAL_TX_PSBT),
        Err(PsbtError::SignedUnsignedTx)
    ));
    assert!(matches!(
        decode(DUPLICATE_INPUT_KEY_PSBT),
        Err(PsbtError::DuplicateKey {
            map: "input",
            key_type: 0x00
        })
    ));
    // The same payload as the first valid vector, cut before its output maps.
    let truncated = &P2PKH_INPUT_PSBT[..P2PKH_INPUT_PSBT.len() - 4];
    assert!(decode(truncated).is_err());
}

// ============================================================================
// BIP-341 key-path sighash
// ============================================================================

fn sighash_psbt(tx_hex: &str, prevouts: Vec<TxOut>, sighash_type: Option<u32>) -> Psbt {
    let tx = Transaction::decode(&hex::decode(tx_hex).unwrap()).unwrap();
    let mut psbt = Psbt::from_unsigned_tx(tx).unwrap();
    for (input, prevout) in psbt.inputs.iter_mut().zip(prevouts) {
        input.witness_utxo = Some(prevout);
        input.sighash_type = sighash_type;
    }
    psbt
}

#[test]
fn key_path_sighash_default() {
    let psbt = sighash_psbt(
        "020000000164eb050a5e3da0c2a65e4786f26d753b7bc69691fabccafb11f7acef36641f1846010000003101b2b404392a22000000000017a9147f2bde86fe78bf68a0544a4f290e12f0b7e0a08c87580200000000000017a91425d11723074ecfb96a0a83c3956bfaf362ae0c908758020000000000001600147e20f938993641de67bb0cdd71682aa34c4d29ad5802000000000000160014c64984dc8761acfa99418bd6bedc79b9287d652d72000000",
        vec![txout(
            2_381_622,
            "542156b39dab4f8f3508e0432cfb41fab110170acaa2d4c42539cb90a4dc7c093bc500",
        )],
        None,
    );

    let sighash = taproot_key_spend_sighash(&psbt, 0).unwrap();
    assert_eq!(
        hex::encode(sighash.digest),
        "33ca0ebfb4a945eeee9569fc0f5040221275f88690b7f8592ada88ce3bdf6703"
    );
    assert!(!sighash.needs_suffix());
}

#[test]
fn key_path_sighash_all_second_input() {
    let spent = "5120f25ad35583ea31998d968871d7de1abd2a52f6fe4178b54ea158274806ff4ece";
    let psbt = sighash_psbt(
        "0200000002fff49be59befe7566050737910f6ccdc5e749c7f8860ddc140386463d88c5ad0f3000000002cf68eb4a3d67f9d4c079249f7e4f27b8854815cb1ed13842d4fbf395f9e217fd605ee24090100000065235d9203f458520000000000160014b6d48333bb13b4c644e57c43a9a26df3a44b785e58020000000000001976a914eea9461a9e1e3f765d3af3e726162e0229fe3eb688ac58020000000000001976a9143a8869c9f2b5ea1d4ff3aeeb6a8fb2fffb1ad5fe88ac0ad7125c",
        vec![txout(2_236_249, spent), txout(3_275_592, spent)],
        Some(1),
    );

    let sighash = taproot_key_spend_sighash(&psbt, 1).unwrap();
    assert_eq!(
        hex::encode(sighash.digest),
        "626ab955d58c9a8a600a0c580549d06dc7da4e802eb2a531f62a588e430967a8"
    );
    assert_eq!(sighash.hash_type, 0x01);
    assert!(sighash.needs_suffix());
}
